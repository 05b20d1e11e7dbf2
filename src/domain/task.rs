//! Named side-effect actions invoked before/after recordings and by cron
//!
//! Tasks are fire-and-forget notifications: `run` spawns into the background
//! and returns immediately, and no caller ever observes a task error. This is
//! deliberate: a hook outage must not be able to mask a recording outage.

use crate::domain::config::TokenExpander;
use log::{error, info, warn};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::process::Command;

/// A named action, exactly one of an HTTP request or a shell command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTask {
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub basic_user: String,
    #[serde(default)]
    pub basic_pass: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub expect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Builds the name → task lookup used by cron and the recording hooks.
/// A name declared twice is replaced by its later declaration.
pub fn build_registry(tasks: &[Task]) -> HashMap<String, Task> {
    let mut registry = HashMap::new();
    for task in tasks {
        if registry.insert(task.name.clone(), task.clone()).is_some() {
            warn!("task {} was previously declared, replacing", task.name);
        }
    }
    registry
}

impl Task {
    /// Spawns the task into the background and returns immediately
    pub fn run(&self, http: &reqwest::Client, expander: &Arc<TokenExpander>) {
        let task = self.clone();
        let http = http.clone();
        let expander = expander.clone();

        tokio::spawn(async move {
            task.execute(http, expander).await;
        });
    }

    async fn execute(&self, http: reqwest::Client, expander: Arc<TokenExpander>) {
        if let Some(command) = &self.command {
            self.execute_command(command, &expander).await;
            return;
        }

        if let Some(request) = &self.request {
            if let Err(e) = request.execute(&http).await {
                error!("error executing request task {}: {}", self.name, e);
            }
        }
    }

    async fn execute_command(&self, command: &str, expander: &TokenExpander) {
        let expanded = expander.expand(command);

        match Command::new("bash").arg("-c").arg(&expanded).output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !stdout.is_empty() {
                    info!("{}", stdout);
                }
                if !output.status.success() {
                    error!(
                        "error executing command task {}: {}",
                        self.name,
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
            }
            Err(e) => error!("error executing command task {}: {}", self.name, e),
        }
    }
}

impl RequestTask {
    /// Method of the request, uppercased. Defaults to GET.
    pub fn method(&self) -> Method {
        if self.method.is_empty() {
            return Method::GET;
        }
        Method::from_bytes(self.method.to_uppercase().as_bytes()).unwrap_or(Method::GET)
    }

    async fn execute(&self, http: &reqwest::Client) -> Result<(), reqwest::Error> {
        let mut request = http.request(self.method(), &self.url);

        for header in &self.headers {
            request = request.header(&header.name, &header.value);
        }

        if !self.basic_user.is_empty() || !self.basic_pass.is_empty() {
            request = request.basic_auth(&self.basic_user, Some(&self.basic_pass));
        }

        let response = request.send().await?;
        let body = response.text().await?;

        if !self.expect.is_empty() && !body.contains(&self.expect) {
            warn!(
                "task returned unexpected result. expected {}, got {}",
                self.expect, body
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::Config;

    fn request_task(method: &str) -> RequestTask {
        RequestTask {
            url: "http://10.0.0.9/on".into(),
            method: method.into(),
            basic_user: String::new(),
            basic_pass: String::new(),
            headers: Vec::new(),
            expect: String::new(),
        }
    }

    #[test]
    fn methods_are_uppercased_with_get_fallback() {
        assert_eq!(request_task("post").method(), Method::POST);
        assert_eq!(request_task("Put").method(), Method::PUT);
        assert_eq!(request_task("").method(), Method::GET);
    }

    #[test]
    fn later_declarations_replace_earlier_ones() {
        let tasks = vec![
            Task {
                name: "lights".into(),
                request: None,
                command: Some("echo one".into()),
            },
            Task {
                name: "lights".into(),
                request: None,
                command: Some("echo two".into()),
            },
        ];

        let registry = build_registry(&tasks);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry["lights"].command.as_deref(), Some("echo two"));
    }

    #[tokio::test]
    async fn command_tasks_swallow_failures() {
        let task = Task {
            name: "broken".into(),
            request: None,
            command: Some("exit 3".into()),
        };

        let expander = Arc::new(TokenExpander::from_config(&Config::default()));
        // must not panic or propagate anything
        task.execute(reqwest::Client::new(), expander).await;
    }
}
