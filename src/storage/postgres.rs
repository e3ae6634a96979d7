use anyhow::Result;
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::storage::traits::Persistence;
use crate::types::{
    Contribution, CostEntry, Role, Session, SessionConfig, SessionId, SessionState, TokenUsage,
    TrajectoryPoint,
};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/V001__initial_schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_trajectory(&self, session_id: SessionId) -> Result<Vec<TrajectoryPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT cycle_number, claim_text, support, embedding
            FROM trajectory_points
            WHERE session_id = $1
            ORDER BY cycle_number ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let embedding: Option<Vector> = r.get("embedding");
                TrajectoryPoint {
                    cycle_number: r.get::<i64, _>("cycle_number") as u64,
                    claim_text: r.get("claim_text"),
                    support: r.get("support"),
                    embedding: embedding.map(|v| v.to_vec()).unwrap_or_default(),
                }
            })
            .collect())
    }
}

fn to_vector(values: &[f32]) -> Option<Vector> {
    if values.is_empty() {
        None
    } else {
        Some(Vector::from(values.to_vec()))
    }
}

fn row_to_session(r: &PgRow) -> Result<Session> {
    let config: SessionConfig = serde_json::from_value(r.get("config"))?;
    let state_str: String = r.get("state");
    let embedding: Option<Vector> = r.get("embedding");

    Ok(Session {
        id: r.get("id"),
        claim: r.get("claim"),
        support: r.get("support"),
        cycle_count: r.get::<i64, _>("cycle_count") as u64,
        cemetery: serde_json::from_value(r.get("cemetery"))?,
        graduated: serde_json::from_value(r.get("graduated"))?,
        trajectory: Vec::new(),
        embedding: embedding.map(|v| v.to_vec()).unwrap_or_default(),
        state: SessionState::parse(&state_str),
        config,
        created_at: r.get("created_at"),
    })
}

fn role_from_row(r: &PgRow) -> Result<Role> {
    let name: String = r.get("role");
    Role::from_str(&name).ok_or_else(|| anyhow::anyhow!("Unknown role in storage: {}", name))
}

#[async_trait]
impl Persistence for PostgresStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, claim, support, cycle_count, cemetery, graduated, embedding,
                state, config, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (id) DO UPDATE
            SET claim = EXCLUDED.claim, support = EXCLUDED.support,
                cycle_count = EXCLUDED.cycle_count, cemetery = EXCLUDED.cemetery,
                graduated = EXCLUDED.graduated, embedding = EXCLUDED.embedding,
                state = EXCLUDED.state, config = EXCLUDED.config, updated_at = NOW()
            "#,
        )
        .bind(session.id)
        .bind(&session.claim)
        .bind(session.support)
        .bind(session.cycle_count as i64)
        .bind(serde_json::to_value(&session.cemetery)?)
        .bind(serde_json::to_value(&session.graduated)?)
        .bind(to_vector(&session.embedding))
        .bind(session.state.as_str())
        .bind(serde_json::to_value(&session.config)?)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_session(&self, id: SessionId) -> Result<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT id, claim, support, cycle_count, cemetery, graduated, embedding,
                   state, config, created_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let mut session = row_to_session(&r)?;
                session.trajectory = self.load_trajectory(id).await?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            r#"
            SELECT id, claim, support, cycle_count, cemetery, graduated, embedding,
                   state, config, created_at
            FROM sessions
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    async fn record_contribution(&self, contribution: &Contribution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contributions (
                session_id, cycle, role, valid, delta, error, response_text, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(contribution.session_id)
        .bind(contribution.cycle as i64)
        .bind(contribution.role.as_str())
        .bind(contribution.valid)
        .bind(contribution.delta)
        .bind(&contribution.error)
        .bind(&contribution.response_text)
        .bind(contribution.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_trajectory_point(
        &self,
        session_id: SessionId,
        point: &TrajectoryPoint,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trajectory_points (session_id, cycle_number, claim_text, support, embedding)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session_id)
        .bind(point.cycle_number as i64)
        .bind(&point.claim_text)
        .bind(point.support)
        .bind(to_vector(&point.embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_cost(&self, entry: &CostEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cost_entries (
                session_id, role, cycle, input_tokens, output_tokens, usd, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.session_id)
        .bind(entry.role.as_str())
        .bind(entry.cycle as i64)
        .bind(entry.usage.input_tokens as i64)
        .bind(entry.usage.output_tokens as i64)
        .bind(entry.usd)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_contributions(&self, session_id: SessionId) -> Result<Vec<Contribution>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, cycle, role, valid, delta, error, response_text, created_at
            FROM contributions
            WHERE session_id = $1
            ORDER BY cycle ASC, created_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(Contribution {
                    session_id: r.get("session_id"),
                    cycle: r.get::<i64, _>("cycle") as u64,
                    role: role_from_row(r)?,
                    valid: r.get("valid"),
                    delta: r.get("delta"),
                    error: r.get("error"),
                    response_text: r.get("response_text"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }

    async fn get_cost_entries(&self, session_id: SessionId) -> Result<Vec<CostEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, role, cycle, input_tokens, output_tokens, usd, recorded_at
            FROM cost_entries
            WHERE session_id = $1
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(CostEntry {
                    session_id: r.get("session_id"),
                    role: role_from_row(r)?,
                    cycle: r.get::<i64, _>("cycle") as u64,
                    usage: TokenUsage {
                        input_tokens: r.get::<i64, _>("input_tokens") as u64,
                        output_tokens: r.get::<i64, _>("output_tokens") as u64,
                    },
                    usd: r.get("usd"),
                    recorded_at: r.get("recorded_at"),
                })
            })
            .collect()
    }
}
