//! Parallel command execution across many hosts with a single global
//! deadline (§4.F). Grounded on `exec::execute`'s one-connection-per-call
//! lifecycle; the correctness fix this adds over the naive version is that a
//! timed-out host is identified by which task index never reported in, not
//! by zipping completion order back onto the original host list (§9 "Fan-out
//! timeout correctness").

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;

use nb_common::HostSshConfig;

use crate::exec;

/// Bounded parallelism default (§5): at most this many hosts are dialed at once.
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct HostCommandResult {
    pub host: String,
    pub result: String,
    pub error: Option<String>,
}

/// Run `cmd` on every host in `hosts`, at most [`DEFAULT_CONCURRENCY`] at a
/// time, waiting no longer than `timeout_secs` in total.
pub async fn run_fanout(cmd: &str, hosts: &[HostSshConfig], timeout_secs: u64) -> Vec<HostCommandResult> {
    run_fanout_bounded(cmd, hosts, timeout_secs, DEFAULT_CONCURRENCY).await
}

/// Same as [`run_fanout`] with an explicit concurrency cap.
///
/// Every host in `hosts` appears exactly once in the result, in unspecified
/// order. A host whose task has not reported back by the deadline gets a
/// synthesized `{host, "", Some("Command Timed out")}` entry — its task is
/// not cancelled, only abandoned: it keeps running against its own socket
/// and is simply never listened to again (§5).
pub async fn run_fanout_bounded(
    cmd: &str,
    hosts: &[HostSshConfig],
    timeout_secs: u64,
    concurrency: usize,
) -> Vec<HostCommandResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    // Sized to the worker count (§5): every host gets exactly one slot.
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, HostCommandResult)>(hosts.len().max(1));

    for (idx, host) in hosts.iter().cloned().enumerate() {
        let cmd = cmd.to_string();
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let host_label = host.host.clone();
            let result = match exec::execute(&host, &cmd).await {
                Ok(stdout) => HostCommandResult { host: host_label, result: stdout, error: None },
                Err(e) => HostCommandResult { host: host_label, result: String::new(), error: Some(e.to_string()) },
            };
            // If the receiver was already dropped (deadline elapsed), this
            // send just fails — the task still ran to completion, nobody is
            // listening for the result anymore.
            let _ = tx.send((idx, result)).await;
        });
    }
    drop(tx);

    let mut completed: Vec<Option<HostCommandResult>> = (0..hosts.len()).map(|_| None).collect();
    let deadline = tokio::time::sleep(Duration::from_secs(timeout_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            received = rx.recv() => {
                match received {
                    Some((idx, result)) => completed[idx] = Some(result),
                    None => break, // every host reported before the deadline
                }
            }
        }
    }

    hosts
        .iter()
        .zip(completed)
        .map(|(host, maybe_result)| {
            maybe_result.unwrap_or_else(|| HostCommandResult {
                host: host.host.clone(),
                result: String::new(),
                error: Some("Command Timed out".to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_common::SshAuth;

    fn unreachable_host(host: &str) -> HostSshConfig {
        HostSshConfig {
            host: host.to_string(),
            port: 22,
            user: "root".to_string(),
            auth: SshAuth::Password("wrong".to_string()),
            connect_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn every_host_gets_exactly_one_result() {
        let hosts = vec![
            unreachable_host("192.0.2.1"),
            unreachable_host("192.0.2.2"),
            unreachable_host("192.0.2.3"),
        ];
        let results = run_fanout_bounded("echo hi", &hosts, 1, 10).await;
        assert_eq!(results.len(), 3);
        let names: Vec<&str> = results.iter().map(|r| r.host.as_str()).collect();
        assert!(names.contains(&"192.0.2.1"));
        assert!(names.contains(&"192.0.2.2"));
        assert!(names.contains(&"192.0.2.3"));
    }

    #[tokio::test]
    async fn unreachable_hosts_carry_an_error_not_a_panic() {
        let hosts = vec![unreachable_host("192.0.2.1")];
        let results = run_fanout_bounded("echo hi", &hosts, 1, 10).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].error.is_some());
    }
}
