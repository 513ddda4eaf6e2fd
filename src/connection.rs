use snafu::{ResultExt, Snafu};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Snafu)]
pub enum ConnectionError {
    #[snafu(display("Failed to open database {}: {}", path.display(), source))]
    Open { path: PathBuf, source: sqlx::Error },

    #[snafu(display("{} is not a readable SQLite database: {}", path.display(), source))]
    Probe { path: PathBuf, source: sqlx::Error },
}

type Result<T, E = ConnectionError> = std::result::Result<T, E>;

/// One opened database file
#[derive(Debug)]
pub struct Shard {
    pub id: String,
    pub path: PathBuf,
    pool: Pool<Sqlite>,
}

impl Shard {
    /// Single-connection pool; every statement on a shard is serialized
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// Open shards, in input-path order
#[derive(Debug, Default)]
pub struct ShardSet {
    shards: Vec<Shard>,
}

impl ShardSet {
    /// Opens every path or none: the first failure closes what was opened and is returned.
    pub async fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut shards = Vec::with_capacity(paths.len());
        for (position, path) in paths.iter().enumerate() {
            let id = shard_id(position);
            match open_shard(id, path.as_ref()).await {
                Ok(shard) => shards.push(shard),
                Err(err) => {
                    for shard in &shards {
                        shard.pool.close().await;
                    }
                    return Err(err);
                }
            }
        }

        info!("Opened {} shard(s)", shards.len());
        Ok(Self { shards })
    }

    pub fn get(&self, id: &str) -> Option<&Shard> {
        self.shards.iter().find(|shard| shard.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub async fn close(&self) {
        for shard in &self.shards {
            shard.pool.close().await;
        }
    }
}

pub fn shard_id(position: usize) -> String {
    format!("shard_{}", position + 1)
}

async fn open_shard(id: String, path: &Path) -> Result<Shard> {
    debug!("Opening {} as {}", path.display(), id);

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context(OpenSnafu { path })?;

    // Opening is lazy about the file header; a catalog read catches corrupt files.
    sqlx::query_scalar::<_, i64>("SELECT count(*) FROM sqlite_master")
        .fetch_one(&pool)
        .await
        .context(ProbeSnafu { path })?;

    Ok(Shard {
        id,
        path: path.to_path_buf(),
        pool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_ids_are_one_based() {
        assert_eq!(shard_id(0), "shard_1");
        assert_eq!(shard_id(9), "shard_10");
    }

    #[tokio::test]
    async fn missing_file_fails_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.db");

        let err = ShardSet::open(&[&missing]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Open { .. }));
        assert!(err.to_string().contains("missing.db"));
    }

    #[tokio::test]
    async fn garbage_file_fails_the_probe() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.db");
        std::fs::write(&garbage, vec![0x42; 4096]).unwrap();

        let err = ShardSet::open(&[&garbage]).await.unwrap_err();
        assert!(err.to_string().contains("garbage.db"));
    }
}
