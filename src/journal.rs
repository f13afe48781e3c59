use crate::errors::StoreError;
use crate::models::Transfer;
use chrono::DateTime;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

const HEADER: &str = "id,from,to,amount,created_at_millis";

/// Append-only transfer journal using CSV format
pub struct Journal {
    path: PathBuf,
    writer: Mutex<File>,
}

impl Journal {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        // Create file if doesn't exist, append if exists
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if file.metadata().await?.len() == 0 {
            file.write_all(format!("{HEADER}\n").as_bytes()).await?;
            file.flush().await?;
        }

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Journal lines for a batch of transfers, ready for [`Journal::append`]
    pub fn encode(transfers: &[Transfer]) -> String {
        transfers.iter().map(format_line).collect()
    }

    /// Append encoded lines; either all of them are flushed or an error is returned
    pub async fn append(&self, lines: &str) -> Result<(), StoreError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(lines.as_bytes()).await?;
        writer.flush().await?;

        Ok(())
    }

    /// Replay all entries from the journal in file order
    pub async fn replay(&self) -> Result<Vec<Transfer>, StoreError> {
        let file = File::open(&self.path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let mut transfers = Vec::new();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() || (line_no == 1 && line.starts_with("id")) {
                continue;
            }
            let transfer = parse_line(&line).map_err(|reason| StoreError::Journal {
                line: line_no,
                reason,
            })?;
            transfers.push(transfer);
        }

        Ok(transfers)
    }
}

fn format_line(t: &Transfer) -> String {
    format!(
        "{},{},{},{},{}\n",
        t.id,
        t.from_account_id,
        t.to_account_id,
        t.amount,
        t.created_at.timestamp_millis()
    )
}

fn parse_line(line: &str) -> Result<Transfer, String> {
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();

    if parts.len() != 5 {
        return Err(format!("expected 5 fields, found {}", parts.len()));
    }

    let field = |i: usize| -> Result<i64, String> {
        parts[i]
            .parse::<i64>()
            .map_err(|e| format!("field {}: {}", i + 1, e))
    };

    let millis = field(4)?;
    let created_at =
        DateTime::from_timestamp_millis(millis).ok_or_else(|| "timestamp out of range".to_string())?;

    let transfer = Transfer {
        id: field(0)?,
        from_account_id: field(1)?,
        to_account_id: field(2)?,
        amount: field(3)?,
        created_at,
    };

    if transfer.amount <= 0 {
        return Err(format!("non-positive amount {}", transfer.amount));
    }
    if transfer.from_account_id == transfer.to_account_id {
        return Err(format!("sender and receiver are both {}", transfer.from_account_id));
    }

    Ok(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parse_line_reads_all_fields() {
        let t = parse_line("7,1,2,10,1700000000000").unwrap();
        assert_eq!(t.id, 7);
        assert_eq!(t.from_account_id, 1);
        assert_eq!(t.to_account_id, 2);
        assert_eq!(t.amount, 10);
        assert_eq!(t.created_at, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
    }

    #[test]
    fn parse_line_rejects_truncated_entry() {
        assert!(parse_line("7,1,2").is_err());
        assert!(parse_line("7,1,two,10,0").is_err());
    }

    #[test]
    fn parse_line_rejects_entries_no_transfer_could_produce() {
        assert!(parse_line("7,1,2,0,0").is_err());
        assert!(parse_line("7,1,2,-9223372036854775808,0").is_err());
        assert!(parse_line("7,3,3,10,0").is_err());
    }

    #[tokio::test]
    async fn replay_returns_appended_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("journal.csv");

        let t = Transfer {
            id: 1,
            from_account_id: 1,
            to_account_id: 2,
            amount: 10,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        };

        {
            let journal = Journal::open(&path).await.unwrap();
            journal
                .append(&Journal::encode(std::slice::from_ref(&t)))
                .await
                .unwrap();
        }

        // Reopening must not write a second header
        let journal = Journal::open(&path).await.unwrap();
        let replayed = journal.replay().await.unwrap();
        assert_eq!(replayed, vec![t]);
    }

    #[tokio::test]
    async fn replay_fails_on_corrupt_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("journal.csv");
        tokio::fs::write(&path, format!("{HEADER}\n1,1,2,10,0\ngarbage\n"))
            .await
            .unwrap();

        let journal = Journal::open(&path).await.unwrap();
        match journal.replay().await {
            Err(StoreError::Journal { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected journal error, got {:?}", other),
        }
    }
}
