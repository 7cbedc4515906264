use super::{ShardError, ShardRecord, POSES, SCORE_LOG, SQL_SCHEMA, SQL_SCHEMA_NUMBER};
use crate::{executors::JobOutput, keys::JobKey};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Result store owned by exactly one worker
#[derive(Debug)]
pub struct ResultShard {
    connection: Connection,
    path: PathBuf,
}

impl ResultShard {
    /// open or create the shard for writing
    pub fn open(path: &Path) -> Result<Self, ShardError> {
        let connection = Connection::open(path).map_err(|error| ShardError::Open {
            path: path.to_path_buf(),
            error,
        })?;

        for (counter, table) in SQL_SCHEMA.iter().enumerate() {
            if let Err(error) = connection.execute(table, []) {
                error!(error = ?error, table = table, "Failed to apply SQL schema ({}/{SQL_SCHEMA_NUMBER}): {error}", counter + 1);

                return Err(ShardError::SQLite(error));
            }
        }

        debug!(path = ?path, "Opened result shard");

        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    /// open an existing shard without the possibility to change it, used for checkpoint scans
    pub fn open_read_only(path: &Path) -> Result<Self, ShardError> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|error| ShardError::Open {
            path: path.to_path_buf(),
            error,
        })?;

        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    /// Append the result of `key`, all parts of the record are written in one transaction
    pub fn append(&mut self, key: &JobKey, output: &JobOutput) -> Result<(), ShardError> {
        let tx = self.connection.transaction()?;

        let id: i64 = tx
            .prepare_cached(
                "insert into dock
                 (receptor, ligand, status, num_pose, mesg)
                 values (?, ?, ?, ?, ?) returning id",
            )?
            .query_row(
                params![
                    key.receptor(),
                    key.ligand(),
                    output.success,
                    output.num_pose,
                    output.message.as_str()
                ],
                |row| row.get(0),
            )?;

        {
            let mut insert_score = tx.prepare_cached(
                "insert into scores (dock, position, score) values (?, ?, ?)",
            )?;

            for (position, score) in output.scores.iter().enumerate() {
                insert_score.execute(params![id, position as i64 + 1, score])?;
            }

            let mut insert_file =
                tx.prepare_cached("insert into files (dock, name, content) values (?, ?, ?)")?;
            insert_file.execute(params![id, SCORE_LOG, output.score_log.as_str()])?;
            insert_file.execute(params![id, POSES, output.poses.as_str()])?;
        }

        tx.commit()?;
        debug!(id = id, key = %key, "Appended result");

        Ok(())
    }

    /// Every key with at least one record, optionally only those with a successful record.
    /// Keys are reported once per receptor/ligand leaf, sorted.
    pub fn keys(&self, success_only: bool) -> Result<Vec<JobKey>, ShardError> {
        let query = if success_only {
            "select receptor, ligand from dock
             group by receptor, ligand having max(status) = 1
             order by receptor, ligand"
        } else {
            "select receptor, ligand from dock
             group by receptor, ligand
             order by receptor, ligand"
        };

        let mut statement = self.connection.prepare_cached(query)?;
        let keys = statement
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .map(|row| -> Result<JobKey, ShardError> {
                let (receptor, ligand) = row?;

                Ok(JobKey::new(receptor, ligand)?)
            })
            .collect();

        keys
    }

    /// read back the latest record stored for `key`
    pub fn record(&self, key: &JobKey) -> Result<Option<ShardRecord>, ShardError> {
        let head = self
            .connection
            .prepare_cached(
                "select id, status, num_pose, mesg from dock
                 where receptor = ? and ligand = ?
                 order by id desc limit 1",
            )?
            .query_row(params![key.receptor(), key.ligand()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;

        let Some((id, success, num_pose, message)) = head else {
            return Ok(None);
        };

        let scores = self
            .connection
            .prepare_cached("select score from scores where dock = ? order by position")?
            .query_map(params![id], |row| row.get::<_, f64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let file = |name: &str| -> Result<String, ShardError> {
            Ok(self
                .connection
                .prepare_cached("select content from files where dock = ? and name = ?")?
                .query_row(params![id, name], |row| row.get(0))
                .optional()?
                .unwrap_or_default())
        };

        Ok(Some(ShardRecord {
            key: key.clone(),
            success,
            num_pose,
            message,
            scores,
            score_log: file(SCORE_LOG)?,
            poses: file(POSES)?,
        }))
    }

    pub fn close(mut self) -> Result<(), ShardError> {
        let mut counter = 0;
        while let Err((connection, error)) = self.connection.close() {
            counter += 1;
            self.connection = connection;
            error!(error = ?error, "Failed to close shard {:?}: {error}, trying again {counter}/3", self.path);

            if counter == 3 {
                return Err(ShardError::SQLite(error));
            }
        }

        info!(path = ?self.path, "Closed result shard");

        Ok(())
    }
}
