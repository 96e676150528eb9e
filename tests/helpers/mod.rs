use anyhow::{Context, Result};
use flashbang::application::StorageLayout;
use flashbang::domain::UnitSpec;
use flashbang::infrastructure::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const HEADER: &str = "#separator:tab\n#html:true\n#tags column:3\nFront\tBack\tTags\n";

/// Test fixture for a temporary flashcard project
#[allow(dead_code)]
pub struct TestWorkspace {
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Config,
    pub layout: StorageLayout,
}

#[allow(dead_code)]
impl TestWorkspace {
    /// Create a project with a default config file and every output directory
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
        let root = temp_dir.path().to_path_buf();
        let config_path = root.join("flashbang.toml");

        let config = Config::create_default(&config_path)?;
        let layout = config.layout();
        for dir in [
            &layout.pdf_dir,
            &layout.markdown_dir,
            &layout.images_dir,
            &layout.anki_dir,
            &layout.apkg_dir,
            &layout.metadata_dir,
        ] {
            fs::create_dir_all(dir).context("Failed to create project directory")?;
        }

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            config_path,
            config,
            layout,
        })
    }

    /// Drop a placeholder PDF into the PDF directory
    pub fn add_pdf(&self, filename: &str) -> Result<PathBuf> {
        let path = self.layout.pdf_dir.join(filename);
        fs::write(&path, b"%PDF-1.4\n%%EOF\n")?;
        Ok(path)
    }

    /// Write `<unit>_anki.txt` with the standard header followed by `body`
    pub fn add_card_file(&self, unit_name: &str, body: &str) -> Result<PathBuf> {
        self.add_raw_card_file(unit_name, &format!("{}{}", HEADER, body))
    }

    pub fn add_raw_card_file(&self, unit_name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.layout.card_file_path(unit_name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn add_image(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.layout.images_dir.join(filename);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn add_markdown(&self, unit_name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.layout.markdown_path(unit_name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Reload the config from disk, picking up discovered PDFs
    pub fn reload(&mut self) -> Result<()> {
        self.config = Config::load(&self.config_path)?;
        self.layout = self.config.layout();
        Ok(())
    }

    pub fn unit(&self, unit_name: &str) -> UnitSpec {
        self.config
            .unit_by_name(unit_name)
            .unwrap_or_else(|| panic!("unit {} not found", unit_name))
    }

    pub fn archive_path(&self, unit_name: &str) -> PathBuf {
        self.layout.archive_path(unit_name)
    }

    pub fn apkg_entries(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.layout.apkg_dir)
    }
}

/// Regular files directly inside `dir`, sorted
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}
