use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::config::CONFIG_FILE;

const ENV_EXAMPLE: &str = r#"# pgmirror environment variables
# Copy this file to .env and fill in your values

# Postgres connection string (the role needs REPLICATION)
DATABASE_URL=

# turbopuffer API key
TURBOPUFFER_API_KEY=
"#;

pub(crate) const SAMPLE_CONFIG: &str = r#"# pgmirror configuration
# ${VAR} references are read from the environment or a .env file

[postgres]
connection_string = "${DATABASE_URL}"

[replication]
slot = "pgmirror"
publication = "pgmirror_pub"
# Upper bound on changes read per poll
max_block_size = 8192
# Sleep between polls that found nothing new
poll_interval_ms = 1000
create_slot = true

[state]
path = "pgmirror_state.db"

[destination]
kind = "turbopuffer"
api_key = "${TURBOPUFFER_API_KEY}"

# One [[tables]] entry per replicated table. Columns are listed in the
# upstream column order.
[[tables]]
name = "users"
schema = "public"
namespace = "users"
id_column = "id"
columns = [
  { name = "id", type = "int64" },
  { name = "email", type = "string" },
  { name = "name", type = "string", nullable = true },
  { name = "tags", type = "array", element = "string", nullable = true },
  { name = "created_at", type = "timestamptz" },
]
"#;

/// Write a sample config and `.env.example` into `dir`, keeping existing files.
pub async fn cmd_init(dir: &Path) -> Result<()> {
    println!("Initializing pgmirror in {}...\n", dir.display());

    write_if_missing(&dir.join(".env.example"), ENV_EXAMPLE)?;
    write_if_missing(&dir.join(CONFIG_FILE), SAMPLE_CONFIG)?;

    // Keep secrets out of version control
    let gitignore = dir.join(".gitignore");
    if gitignore.exists() {
        let content = fs::read_to_string(&gitignore)?;
        if !content.lines().any(|l| l.trim() == ".env") {
            let mut file = fs::OpenOptions::new().append(true).open(&gitignore)?;
            writeln!(file, "\n# pgmirror secrets\n.env")?;
            println!("Added .env to .gitignore");
        }
    } else {
        fs::write(&gitignore, "# pgmirror secrets\n.env\n")?;
        println!("Created .gitignore with .env");
    }

    println!("\n{}", "pgmirror initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Copy .env.example to .env and fill in your credentials");
    println!("  2. Describe your tables in {}", CONFIG_FILE);
    println!("  3. Run: pgmirror setup");
    println!("  4. Run: pgmirror run\n");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping", path.display());
    } else {
        fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}
