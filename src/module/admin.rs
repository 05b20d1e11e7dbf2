//! Embedded admin HTTP surface
//!
//! A thin HTML dashboard over core state plus a static file server for the
//! recording area and a handful of control endpoints. Basic auth applies to
//! everything once credentials are configured.

use crate::constants::EXIT_CODE_REBOOT;
use crate::domain::host;
use crate::library::helpers::{parse_bind_addr, tail_file};
use crate::library::scheduling::{Job, StopSignal};
use crate::module::context::Runtime;
use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use log::{error, info};
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::sleep;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

#[derive(Debug)]
struct Unauthorized;

impl warp::reject::Reject for Unauthorized {}

pub struct AdminJob;

#[async_trait]
impl Job for AdminJob {
    type Context = Runtime;

    const NAME: &'static str = module_path!();

    async fn run(&self, runtime: Runtime, stop: StopSignal) -> Result<()> {
        let addr = parse_bind_addr(&runtime.settings.admin_addr)
            .with_context(|| format!("invalid admin address {}", runtime.settings.admin_addr))?;

        let auth = auth_filter(&runtime.config.admin.user, &runtime.config.admin.pass);

        let with_runtime = {
            let runtime = runtime.clone();
            warp::any().map(move || runtime.clone())
        };

        let dashboard = warp::path::end()
            .and(warp::get())
            .and(warp::query::<HashMap<String, String>>())
            .and(with_runtime.clone())
            .and_then(dashboard_page);

        let videos = warp::path("videos").and(warp::fs::dir(runtime.settings.videos_dir.clone()));

        let restart = warp::path("restart")
            .and(warp::path::end())
            .and(with_runtime.clone())
            .map(|runtime: Runtime| {
                let mut stone = runtime.heart_stone.clone();
                tokio::spawn(async move {
                    sleep(Duration::from_secs(1)).await;
                    stone.request_restart("admin restart").await;
                });
                warp::reply::html(countdown_page("restarting...", 2))
            });

        let reboot = warp::path("reboot")
            .and(warp::path::end())
            .and(with_runtime.clone())
            .map(|runtime: Runtime| {
                let mut stone = runtime.heart_stone.clone();
                tokio::spawn(async move {
                    sleep(Duration::from_secs(1)).await;
                    stone.request_reboot("admin reboot").await;
                });
                warp::reply::html(countdown_page("rebooting... waiting 60 seconds...", 60))
            });

        let force_reboot = warp::path("force-reboot")
            .and(warp::path::end())
            .map(|| {
                tokio::spawn(async move {
                    sleep(Duration::from_secs(1)).await;
                    std::process::exit(EXIT_CODE_REBOOT);
                });
                warp::reply::html(countdown_page(
                    "force rebooting... waiting 60 seconds...",
                    60,
                ))
            });

        let clearlog = warp::path("clearlog")
            .and(warp::path::end())
            .and(with_runtime)
            .and_then(clear_log);

        let routes = auth
            .and(
                dashboard
                    .or(videos)
                    .or(restart)
                    .or(reboot)
                    .or(force_reboot)
                    .or(clearlog),
            )
            .recover(handle_rejection);

        let (bound, server) = warp::serve(routes)
            .bind_with_graceful_shutdown(addr, async move { stop.wait().await });

        info!("starting admin server on {}", bound);
        server.await;

        Ok(())
    }
}

fn auth_filter(user: &str, pass: &str) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    let expected = if user.is_empty() && pass.is_empty() {
        None
    } else {
        Some(format!(
            "Basic {}",
            base64::encode(format!("{}:{}", user, pass))
        ))
    };

    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let expected = expected.clone();
            async move {
                match &expected {
                    None => Ok(()),
                    Some(required) if header.as_deref() == Some(required.as_str()) => Ok(()),
                    _ => Err(warp::reject::custom(Unauthorized)),
                }
            }
        })
        .untuple_one()
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if err.find::<Unauthorized>().is_some() {
        let reply = warp::reply::with_status("Unauthorized.", StatusCode::UNAUTHORIZED);
        let reply =
            warp::reply::with_header(reply, "WWW-Authenticate", "Basic realm=\"vigilantpi\"");
        Ok(reply)
    } else {
        Err(err)
    }
}

async fn dashboard_page(
    query: HashMap<String, String>,
    runtime: Runtime,
) -> Result<impl Reply, Infallible> {
    let disk = if query.contains_key("withdf") {
        host::disk_free().await
    } else {
        r#"<a href="/?withdf=1">Update</a>"#.to_owned()
    };

    let log = match &runtime.settings.log_file {
        Some(path) => tail_file(path, 50).await,
        None => "log file not configured".to_owned(),
    };

    let config_dump = runtime
        .config
        .serialize()
        .unwrap_or_else(|e| format!("error dumping configuration: {}", e));

    let page = format!(
        r#"<!DOCTYPE html>
<html charset="utf-8">
<body>
	<h3 style="color:blue">VigilantPI - Admin</h3>
	<pre>Version: {version}</pre>

	<pre>IP: {ip}</pre>

	<br>
	<a href="/videos/">Videos</a>
	<hr>

	<a href="/restart" onclick="return confirm('Are you sure?')">Restart</a> | <a href="/reboot" onclick="return confirm('Are you sure?')">Reboot OS</a> | <a href="/force-reboot" style="color:red" onclick="return confirm('This may DAMAGE your system. Are you sure?')">Force Reboot OS</a> | <a href="/clearlog" onclick="return confirm('Are you sure?')">Clear log</a>

	<h4>Server Date</h4>
	<pre>{date}</pre>
	<pre>Up since: {started}</pre>
	<hr>
	<br>

	<h4>DF (disk space)</h4>
	<pre>{df}</pre>
	<hr>
	<br>

	<h4>Log</h4>
	<pre>{log}</pre>
	<hr>
	<br>

	<h4>Config</h4>
	<pre>{config}</pre>
	<hr>
	<br>

</body>
</html>
"#,
        version = runtime.settings.version,
        ip = host::local_ips().await,
        date = host::server_date().await,
        started = runtime.settings.started.format("%a %b %d %H:%M:%S %Y"),
        df = disk,
        log = log,
        config = config_dump,
    );

    Ok(warp::reply::html(page))
}

async fn clear_log(runtime: Runtime) -> Result<impl Reply, Infallible> {
    if let Some(path) = &runtime.settings.log_file {
        if let Err(e) = tokio::fs::write(path, b"").await {
            error!("error clearing log: {}", e);
        }
    }

    let reply = warp::reply::with_status(warp::reply(), StatusCode::FOUND);
    Ok(warp::reply::with_header(reply, "Location", "/"))
}

fn countdown_page(message: &str, seconds: u32) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body>
<h3 style="color:blue">{}</h3>
<script>
setTimeout(function() {{
	window.location = "/";
}}, 1000*{});
</script>
</body>
</html>
"#,
        message, seconds
    )
}
