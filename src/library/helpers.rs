//! Helper functions that don't belong elsewhere

use std::net::SocketAddr;
use std::path::Path;
use tokio::process::Command;

/// Characters that are never allowed to reach the host shell.
const SHELL_META: [char; 5] = ['$', '`', '!', '(', ')'];

/// Strips shell metacharacters from operator supplied strings that end up in
/// host commands (mount devices, directories and the like).
pub fn safe_shell(input: &str) -> String {
    input.chars().filter(|c| !SHELL_META.contains(c)).collect()
}

/// Runs a host command and returns its stdout, or the error text when the
/// command could not be executed. Intended for diagnostic output only.
pub async fn exec_string(cmd: &str, args: &[&str]) -> String {
    match Command::new(cmd).args(args).output().await {
        Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
        Err(e) => e.to_string(),
    }
}

/// Last lines of the given file, via the host `tail` so the file does not
/// have to fit in memory.
pub async fn tail_file(path: &Path, lines: usize) -> String {
    exec_string("tail", &["-n", &lines.to_string(), &path.to_string_lossy()]).await
}

/// Parses a bind address, accepting the `:port` shorthand for all interfaces.
pub fn parse_bind_addr(addr: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr).parse()
    } else {
        addr.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_shell_strips_metacharacters() {
        assert_eq!(safe_shell("/dev/sda1"), "/dev/sda1");
        assert_eq!(safe_shell("$(reboot)"), "reboot");
        assert_eq!(safe_shell("a`b!c"), "abc");
    }

    #[test]
    fn bind_addr_accepts_port_shorthand() {
        assert_eq!(
            parse_bind_addr(":80").unwrap(),
            "0.0.0.0:80".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_bind_addr("127.0.0.1:8080").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }
}
