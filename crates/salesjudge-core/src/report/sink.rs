use anyhow::Context;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Destination for report artifacts.
pub trait ReportSink {
    fn write_report(&mut self, name: &str, content: &[u8]) -> anyhow::Result<()>;
}

/// Writes each artifact under a root directory, creating parents as needed.
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ReportSink for DirSink {
    fn write_report(&mut self, name: &str, content: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create report dir {}", parent.display()))?;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl MemorySink {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.files
            .get(name)
            .and_then(|b| std::str::from_utf8(b).ok())
    }
}

impl ReportSink for MemorySink {
    fn write_report(&mut self, name: &str, content: &[u8]) -> anyhow::Result<()> {
        self.files.insert(name.to_string(), content.to_vec());
        Ok(())
    }
}
