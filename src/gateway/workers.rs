//! Worker discovery from `CLIENT LIST`
//!
//! BullMQ workers name their connection after the key prefix, so the
//! connected worker set is the client list filtered by name.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{GatewayResult, WorkerSource};
use crate::model::WorkerSnapshot;

/// [`WorkerSource`] reading the server's client list
pub struct RedisWorkerSource {
    conn: ConnectionManager,
}

impl RedisWorkerSource {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl WorkerSource for RedisWorkerSource {
    async fn list_workers(&self) -> GatewayResult<Vec<WorkerSnapshot>> {
        let mut conn = self.conn.clone();
        let raw: String = redis::cmd("CLIENT").arg("LIST").query_async(&mut conn).await?;
        Ok(parse_client_list(&raw))
    }
}

fn is_worker_name(name: &str) -> bool {
    name.starts_with("bull") || name.contains("Worker")
}

/// Parse `CLIENT LIST` output, keeping only worker connections
pub(crate) fn parse_client_list(raw: &str) -> Vec<WorkerSnapshot> {
    raw.lines()
        .filter_map(|line| {
            let mut id = None;
            let mut name = None;
            let mut address = None;
            let mut age = 0;
            let mut idle = 0;
            for field in line.split_whitespace() {
                let Some((key, value)) = field.split_once('=') else {
                    continue;
                };
                match key {
                    "id" => id = Some(value),
                    "name" => name = Some(value),
                    "addr" => address = Some(value),
                    "age" => age = value.parse().unwrap_or(0),
                    "idle" => idle = value.parse().unwrap_or(0),
                    _ => {}
                }
            }
            let name = name.filter(|n| is_worker_name(n))?;
            Some(WorkerSnapshot {
                id: id?.to_string(),
                name: name.to_string(),
                address: address.unwrap_or_default().to_string(),
                age_seconds: age,
                idle_seconds: idle,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
id=3 addr=127.0.0.1:51000 laddr=127.0.0.1:6379 fd=8 name=bull:b3JkZXJz:w:mailer age=120 idle=1 flags=N db=0
id=4 addr=127.0.0.1:51002 laddr=127.0.0.1:6379 fd=9 name= age=5 idle=5 flags=N db=0
id=5 addr=10.0.0.2:40000 laddr=127.0.0.1:6379 fd=10 name=ImageWorker-1 age=3600 idle=0 flags=N db=0
id=6 addr=10.0.0.3:40001 laddr=127.0.0.1:6379 fd=11 name=redis-cli age=1 idle=1 flags=N db=0
";

    #[test]
    fn keeps_only_worker_connections() {
        let workers = parse_client_list(SAMPLE);
        let ids: Vec<&str> = workers.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "5"]);
    }

    #[test]
    fn reads_address_and_timings() {
        let workers = parse_client_list(SAMPLE);
        assert_eq!(workers[1].name, "ImageWorker-1");
        assert_eq!(workers[1].address, "10.0.0.2:40000");
        assert_eq!(workers[1].age_seconds, 3600);
        assert_eq!(workers[1].idle_seconds, 0);
    }

    #[test]
    fn empty_listing_yields_no_workers() {
        assert!(parse_client_list("").is_empty());
    }
}
