//! PostgreSQL Run Repository
//!
//! Durable store of runs and run hosts.

use async_trait::async_trait;
use dispatcher_server_domain::{
    CorrelationId, DomainError, HostWrite, Labels, RecipientId, Result, Run, RunHost, RunHostId,
    RunId, RunRepository, RunSnapshot, RunStatus, SweepResult, UpdateOutcome, UpdatePlanner,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

/// Separator inserted where partial satellite output is missing
const SKIPPED_OUTPUT: &str = "\n\u{2026}\n";

const RUN_COLUMNS: &str = r#"
    id, org_id, recipient, correlation_id, url, status, labels, timeout, service,
    sat_id, sat_org_id, playbook_name, playbook_run_url, principal, response_full,
    created_at, updated_at
"#;

/// Full responses replace the log with the newest console output
const REPLACE_SATELLITE_HOST: &str = r#"
    UPDATE run_hosts SET
        status = CASE WHEN sat_sequence IS NULL OR sat_sequence < $3 THEN $4::varchar ELSE status END,
        log = CASE WHEN sat_sequence IS NULL OR sat_sequence < $3 THEN $5::text ELSE log END,
        sat_sequence = CASE WHEN sat_sequence IS NULL OR sat_sequence < $3 THEN $3 ELSE sat_sequence END,
        updated_at = NOW()
    WHERE run_id = $1 AND inventory_id = $2
"#;

/// Partial responses append; a gap in the sequence is marked with $6
const APPEND_SATELLITE_HOST: &str = r#"
    UPDATE run_hosts SET
        status = CASE WHEN sat_sequence IS NULL OR sat_sequence < $3 THEN $4::varchar ELSE status END,
        log = CASE
            WHEN (sat_sequence IS NULL AND $3 > 0) OR sat_sequence + 1 < $3 THEN log || $6::text || $5::text
            WHEN sat_sequence > $3 THEN log
            ELSE log || $5::text
        END,
        sat_sequence = CASE WHEN sat_sequence IS NULL OR sat_sequence < $3 THEN $3 ELSE sat_sequence END,
        updated_at = NOW()
    WHERE run_id = $1 AND inventory_id = $2
"#;

/// PostgreSQL Run Repository
#[derive(Clone)]
pub struct PostgresRunRepository {
    pool: PgPool,
}

impl PostgresRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::persistence(format!("{}: {}", context, e))
}

fn parse_status(raw: &str) -> Result<RunStatus> {
    raw.parse()
        .map_err(|e| DomainError::persistence(format!("corrupt status column: {}", e)))
}

fn row_to_run(row: &PgRow) -> Result<Run> {
    let labels: serde_json::Value = row.try_get("labels").map_err(db_error("labels"))?;
    let labels: Labels = serde_json::from_value(labels)
        .map_err(|e| DomainError::persistence(format!("corrupt labels column: {}", e)))?;
    let status: String = row.try_get("status").map_err(db_error("status"))?;

    Ok(Run {
        id: RunId::from_uuid(row.try_get("id").map_err(db_error("id"))?),
        org_id: row.try_get("org_id").map_err(db_error("org_id"))?,
        recipient: RecipientId(row.try_get("recipient").map_err(db_error("recipient"))?),
        correlation_id: CorrelationId::from_uuid(
            row.try_get("correlation_id")
                .map_err(db_error("correlation_id"))?,
        ),
        url: row.try_get("url").map_err(db_error("url"))?,
        status: parse_status(&status)?,
        labels,
        timeout: row.try_get("timeout").map_err(db_error("timeout"))?,
        service: row.try_get("service").map_err(db_error("service"))?,
        sat_id: row.try_get("sat_id").map_err(db_error("sat_id"))?,
        sat_org_id: row.try_get("sat_org_id").map_err(db_error("sat_org_id"))?,
        name: row.try_get("playbook_name").map_err(db_error("playbook_name"))?,
        web_console_url: row
            .try_get("playbook_run_url")
            .map_err(db_error("playbook_run_url"))?,
        principal: row.try_get("principal").map_err(db_error("principal"))?,
        response_full: row
            .try_get("response_full")
            .map_err(db_error("response_full"))?,
        created_at: row.try_get("created_at").map_err(db_error("created_at"))?,
        updated_at: row.try_get("updated_at").map_err(db_error("updated_at"))?,
    })
}

fn row_to_host(row: &PgRow) -> Result<RunHost> {
    let status: String = row.try_get("status").map_err(db_error("status"))?;

    Ok(RunHost {
        id: RunHostId(row.try_get("id").map_err(db_error("id"))?),
        run_id: RunId::from_uuid(row.try_get("run_id").map_err(db_error("run_id"))?),
        inventory_id: row.try_get("inventory_id").map_err(db_error("inventory_id"))?,
        host: row.try_get("host").map_err(db_error("host"))?,
        status: parse_status(&status)?,
        log: row.try_get("log").map_err(db_error("log"))?,
        sat_sequence: row.try_get("sat_sequence").map_err(db_error("sat_sequence"))?,
    })
}

#[async_trait]
impl RunRepository for PostgresRunRepository {
    async fn create(&self, run: &Run, hosts: &[RunHost]) -> Result<()> {
        let labels = serde_json::to_value(&run.labels)
            .map_err(|e| DomainError::persistence(format!("Failed to serialize labels: {}", e)))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO runs
                (id, org_id, recipient, correlation_id, url, status, labels, timeout, service,
                 sat_id, sat_org_id, playbook_name, playbook_run_url, principal, response_full,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(run.id.as_uuid())
        .bind(&run.org_id)
        .bind(run.recipient.as_uuid())
        .bind(run.correlation_id.as_uuid())
        .bind(&run.url)
        .bind(run.status.as_str())
        .bind(labels)
        .bind(run.timeout)
        .bind(&run.service)
        .bind(run.sat_id)
        .bind(&run.sat_org_id)
        .bind(&run.name)
        .bind(&run.web_console_url)
        .bind(&run.principal)
        .bind(run.response_full)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert run"))?;

        for host in hosts {
            sqlx::query(
                r#"
                INSERT INTO run_hosts (id, run_id, inventory_id, host, status, log, sat_sequence)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(host.id.0)
            .bind(host.run_id.as_uuid())
            .bind(host.inventory_id)
            .bind(&host.host)
            .bind(host.status.as_str())
            .bind(&host.log)
            .bind(host.sat_sequence)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to insert run host"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit run"))?;

        debug!(run_id = %run.id, hosts = hosts.len(), "Run stored");
        Ok(())
    }

    async fn find_by_id(&self, org_id: &str, run_id: &RunId) -> Result<Option<Run>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM runs WHERE id = $1 AND org_id = $2",
            RUN_COLUMNS
        ))
        .bind(run_id.as_uuid())
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load run"))?;

        row.as_ref().map(row_to_run).transpose()
    }

    async fn find_hosts(&self, run_id: &RunId) -> Result<Vec<RunHost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, inventory_id, host, status, log, sat_sequence
            FROM run_hosts
            WHERE run_id = $1
            ORDER BY host
            "#,
        )
        .bind(run_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load run hosts"))?;

        rows.iter().map(row_to_host).collect()
    }

    async fn apply_update(
        &self,
        org_id: &str,
        correlation_id: &CorrelationId,
        planner: &dyn UpdatePlanner,
    ) -> Result<UpdateOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let row = sqlx::query(
            r#"
            SELECT id, status, response_full
            FROM runs
            WHERE org_id = $1 AND correlation_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(org_id)
        .bind(correlation_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to lock run"))?;

        let Some(row) = row else {
            return Ok(UpdateOutcome::Missed);
        };

        let status: String = row.try_get("status").map_err(db_error("status"))?;
        let snapshot = RunSnapshot {
            id: RunId::from_uuid(row.try_get("id").map_err(db_error("id"))?),
            status: parse_status(&status)?,
            response_full: row
                .try_get("response_full")
                .map_err(db_error("response_full"))?,
        };

        let plan = planner.plan(&snapshot);

        let stored_status: String = sqlx::query_scalar(
            r#"
            UPDATE runs
            SET status = COALESCE($2, status), events = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(plan.status.map(|s| s.as_str()))
        .bind(&plan.events)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to update run"))?;

        for write in &plan.hosts {
            match write {
                HostWrite::Upsert { host, status, log } => {
                    sqlx::query(
                        r#"
                        INSERT INTO run_hosts (id, run_id, host, status, log)
                        VALUES ($1, $2, $3, $4, $5)
                        ON CONFLICT (run_id, host) DO UPDATE SET
                            status = EXCLUDED.status,
                            log = EXCLUDED.log,
                            updated_at = NOW()
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(snapshot.id.as_uuid())
                    .bind(host)
                    .bind(status.as_str())
                    .bind(log)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Failed to upsert run host"))?;
                }
                HostWrite::Sequenced {
                    inventory_id,
                    sequence,
                    status,
                    console,
                    append,
                } => {
                    let statement = if *append {
                        APPEND_SATELLITE_HOST
                    } else {
                        REPLACE_SATELLITE_HOST
                    };

                    let mut query = sqlx::query(statement)
                        .bind(snapshot.id.as_uuid())
                        .bind(inventory_id)
                        .bind(sequence)
                        .bind(status.as_str())
                        .bind(console);
                    if *append {
                        query = query.bind(SKIPPED_OUTPUT);
                    }

                    query
                        .execute(&mut *tx)
                        .await
                        .map_err(db_error("Failed to update satellite host"))?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit run update"))?;

        Ok(UpdateOutcome::Updated {
            run_id: snapshot.id,
            status: parse_status(&stored_status)?,
        })
    }

    async fn mark_timed_out(&self) -> Result<SweepResult> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let expired: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE runs
            SET status = 'timeout', updated_at = NOW()
            WHERE status = 'running'
              AND created_at + timeout * interval '1 second' <= NOW()
            RETURNING id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("Failed to time out runs"))?;

        let hosts = sqlx::query(
            r#"
            UPDATE run_hosts
            SET status = 'timeout', updated_at = NOW()
            WHERE status = 'running'
              AND run_id IN (SELECT id FROM runs WHERE status = 'timeout')
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to time out run hosts"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit timeout sweep"))?;

        Ok(SweepResult {
            runs_timed_out: expired.len() as u64,
            hosts_timed_out: hosts.rows_affected(),
        })
    }
}
