//! Publication management.

use std::collections::HashSet;
use std::fmt;

use tokio_postgres::Client;
use tracing::{debug, info};

use crate::error::{PgError, PgResult};

/// Quote an identifier for use in SQL (double quotes).
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// A schema-qualified upstream table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `"schema"."name"`, safe to splice into DDL.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

fn quoted_list(tables: &[TableRef]) -> String {
    tables
        .iter()
        .map(TableRef::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn publication_exists(client: &Client, publication: &str) -> PgResult<bool> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_publication WHERE pubname = $1)",
            &[&publication],
        )
        .await?
        .get(0);

    Ok(exists)
}

/// Tables currently published by `publication`.
pub async fn publication_tables(client: &Client, publication: &str) -> PgResult<HashSet<TableRef>> {
    let rows = client
        .query(
            "SELECT schemaname::text, tablename::text FROM pg_publication_tables WHERE pubname = $1",
            &[&publication],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|r| TableRef::new(r.get::<_, String>(0), r.get::<_, String>(1)))
        .collect())
}

/// Create `publication` for `tables`, or add the ones it is missing.
pub async fn ensure_publication(client: &Client, publication: &str, tables: &[TableRef]) -> PgResult<()> {
    if tables.is_empty() {
        return Err(PgError::Replication(format!(
            "publication '{}' needs at least one table",
            publication
        )));
    }

    if !publication_exists(client, publication).await? {
        info!(publication = %publication, tables = %quoted_list(tables), "Creating publication");
        client
            .execute(
                &format!(
                    "CREATE PUBLICATION {} FOR TABLE {}",
                    quote_ident(publication),
                    quoted_list(tables)
                ),
                &[],
            )
            .await?;
        return Ok(());
    }

    let current = publication_tables(client, publication).await?;
    let missing = missing_tables(&current, tables);
    debug!(publication = %publication, current = current.len(), missing = missing.len(), "Checked publication tables");

    if missing.is_empty() {
        info!(publication = %publication, "Publication has all required tables");
        return Ok(());
    }

    info!(publication = %publication, tables = %quoted_list(&missing), "Adding tables to publication");
    client
        .execute(
            &format!(
                "ALTER PUBLICATION {} ADD TABLE {}",
                quote_ident(publication),
                quoted_list(&missing)
            ),
            &[],
        )
        .await
        .map_err(|e| PgError::Replication(format!("Failed to add tables to publication: {}", e)))?;

    Ok(())
}

pub async fn drop_publication(client: &Client, publication: &str) -> PgResult<()> {
    info!(publication = %publication, "Dropping publication");
    client
        .execute(
            &format!("DROP PUBLICATION IF EXISTS {}", quote_ident(publication)),
            &[],
        )
        .await?;

    Ok(())
}

fn missing_tables(current: &HashSet<TableRef>, required: &[TableRef]) -> Vec<TableRef> {
    required
        .iter()
        .filter(|t| !current.contains(*t))
        .cloned()
        .collect()
}
