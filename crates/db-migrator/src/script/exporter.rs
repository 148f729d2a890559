//! Destinations for generated scripts.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::session::Session;
use crate::error::Result;

#[async_trait]
pub trait ScriptExporter: Send {
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn export_scripts(&mut self, scripts: &[String]) -> Result<()>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes scripts as `;` terminated lines.
#[derive(Debug)]
pub struct WriterScriptExporter<W> {
    writer: W,
}

/// Script file on disk.
pub type FileScriptExporter = WriterScriptExporter<BufWriter<File>>;

impl<W: Write + Send> WriterScriptExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl FileScriptExporter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Writing scripts to {}", path.display());
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl WriterScriptExporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> ScriptExporter for WriterScriptExporter<W> {
    async fn export_scripts(&mut self, scripts: &[String]) -> Result<()> {
        for script in scripts {
            let script = script.trim_end();
            self.writer.write_all(script.as_bytes())?;
            if !script.ends_with(';') {
                self.writer.write_all(b";")?;
            }
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Executes scripts on a live session.
///
/// A failing `DROP` is logged and skipped since the object may not exist
/// yet; any other failure stops the export.
pub struct SessionScriptExporter<'s> {
    session: &'s mut dyn Session,
    executed: usize,
}

impl<'s> SessionScriptExporter<'s> {
    pub fn new(session: &'s mut dyn Session) -> Self {
        Self { session, executed: 0 }
    }

    /// Statements that ran successfully.
    pub fn executed(&self) -> usize {
        self.executed
    }
}

#[async_trait]
impl ScriptExporter for SessionScriptExporter<'_> {
    async fn export_scripts(&mut self, scripts: &[String]) -> Result<()> {
        for script in scripts {
            let sql = script.trim().trim_end_matches(';');
            debug!("Executing: {}", sql);
            match self.session.execute(sql, &[]).await {
                Ok(_) => self.executed += 1,
                Err(e) if is_drop(sql) => warn!("Ignoring failed drop: {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn is_drop(sql: &str) -> bool {
    let upper = sql.trim_start().to_ascii_uppercase();
    upper.starts_with("DROP ")
        || (upper.starts_with("ALTER TABLE")
            && [" DROP CONSTRAINT ", " DROP FOREIGN KEY ", " DROP PRIMARY KEY"]
                .iter()
                .any(|clause| upper.contains(clause)))
}
