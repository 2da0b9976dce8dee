//! Purpose: Stage plugin sources and deploy them as a folder or `.op` archive.
//! Exports: `PluginLayout`, `PackageKind`, `Deployment`, `deploy`,
//! `copy_plugin_files`, `write_archive`.
//! Role: Filesystem side of `opdev build`; the reload request happens afterwards.
//! Invariants: A deployment leaves exactly one of `<Plugins>/<id>` or `<Plugins>/<id>.op`.
//! Invariants: Archive entry names are relative to the staging root and use `/`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::api::PluginKind;
use crate::core::error::{Error, ErrorKind, fs_error_kind};

pub const INFO_TOML: &str = "info.toml";
pub const SOURCE_DIR: &str = "src";
pub const DIST_DIR: &str = "dist";
pub const STAGING_DIR: &str = "temp";
pub const ARCHIVE_EXTENSION: &str = "op";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PackageKind {
    /// Copy sources into `<Plugins>/<id>/`.
    Folder,
    /// Zip sources into `<Plugins>/<id>.op`.
    Op,
}

impl PackageKind {
    pub fn plugin_kind(self) -> PluginKind {
        match self {
            PackageKind::Folder => PluginKind::Folder,
            PackageKind::Op => PluginKind::Zip,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PackageKind::Folder => "folder",
            PackageKind::Op => ".op file",
        }
    }
}

/// On-disk layout of a plugin project; the id is the project directory name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PluginLayout {
    root: PathBuf,
    id: String,
}

impl PluginLayout {
    pub fn from_dir(dir: &Path) -> Result<Self, Error> {
        let root = fs::canonicalize(dir)
            .map_err(|err| fs_error(err, "failed to resolve plugin directory", dir))?;
        let id = root
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message("cannot derive a plugin id from this directory")
                    .with_path(&root)
            })?;
        Ok(Self { root, id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join(SOURCE_DIR)
    }

    pub fn info_toml(&self) -> PathBuf {
        self.root.join(INFO_TOML)
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.root.join(DIST_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dist_dir().join(STAGING_DIR)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dist_dir().join(self.archive_name())
    }

    pub fn archive_name(&self) -> String {
        format!("{}.{ARCHIVE_EXTENSION}", self.id)
    }

    pub fn ensure_manifest(&self) -> Result<(), Error> {
        let manifest = self.info_toml();
        if manifest.is_file() {
            return Ok(());
        }
        Err(Error::new(ErrorKind::NotFound)
            .with_message(format!("plugin manifest {INFO_TOML} not found"))
            .with_path(manifest)
            .with_hint("Run opdev from the plugin root or pass --dir."))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deployment {
    pub kind: PackageKind,
    pub destination: PathBuf,
    /// The other layout's leftover, removed so the host sees one copy.
    pub removed: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub files: usize,
}

pub fn deploy(
    layout: &PluginLayout,
    kind: PackageKind,
    plugins_dir: &Path,
) -> Result<Deployment, Error> {
    layout.ensure_manifest()?;
    let dest_folder = plugins_dir.join(layout.id());
    let dest_archive = plugins_dir.join(layout.archive_name());

    match kind {
        PackageKind::Folder => {
            let removed = remove_if_exists(&dest_archive)?;
            let files = copy_plugin_files(&layout.src_dir(), &layout.info_toml(), &dest_folder)?;
            Ok(Deployment {
                kind,
                destination: dest_folder,
                removed,
                archive: None,
                files,
            })
        }
        PackageKind::Op => {
            let removed = remove_if_exists(&dest_folder)?;
            let staging = layout.staging_dir();
            copy_plugin_files(&layout.src_dir(), &layout.info_toml(), &staging)?;
            let archive = layout.archive_path();
            let files = write_archive(&staging, &archive)?;
            fs::remove_dir_all(&staging)
                .map_err(|err| fs_error(err, "failed to remove staging directory", &staging))?;
            fs::copy(&archive, &dest_archive).map_err(|err| {
                fs_error(err, "failed to copy archive into plugins directory", &dest_archive)
            })?;
            Ok(Deployment {
                kind,
                destination: dest_archive,
                removed,
                archive: Some(archive),
                files,
            })
        }
    }
}

/// Recreate `dest` with `info.toml` plus the recursive contents of `src_dir`.
/// Returns the number of files copied.
pub fn copy_plugin_files(src_dir: &Path, info_toml: &Path, dest: &Path) -> Result<usize, Error> {
    remove_if_exists(dest)?;
    fs::create_dir_all(dest).map_err(|err| fs_error(err, "failed to create directory", dest))?;
    fs::copy(info_toml, dest.join(INFO_TOML))
        .map_err(|err| fs_error(err, "failed to copy plugin manifest", info_toml))?;
    let mut files = 1;

    if !src_dir.is_dir() {
        debug!(src = %src_dir.display(), "no source directory; deploying manifest only");
        return Ok(files);
    }

    for entry in WalkDir::new(src_dir).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to walk plugin sources")
                .with_path(src_dir)
                .with_source(err)
        })?;
        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("source path escaped root")
                    .with_source(err)
            })?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| fs_error(err, "failed to create directory", &target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| fs_error(err, "failed to create directory", parent))?;
        }
        fs::copy(entry.path(), &target)
            .map_err(|err| fs_error(err, "failed to copy plugin file", entry.path()))?;
        files += 1;
    }

    debug!(dest = %dest.display(), files, "copied plugin files");
    Ok(files)
}

/// Deflate every file under `staging` into a zip at `archive`.
/// Returns the number of entries written.
pub fn write_archive(staging: &Path, archive: &Path) -> Result<usize, Error> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| fs_error(err, "failed to create directory", parent))?;
    }
    let file =
        File::create(archive).map_err(|err| fs_error(err, "failed to create archive", archive))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0;

    for entry in WalkDir::new(staging).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to walk staging directory")
                .with_path(staging)
                .with_source(err)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = archive_entry_name(staging, entry.path())?;
        writer.start_file(name, options).map_err(|err| zip_error(err, archive))?;
        let mut source = File::open(entry.path())
            .map_err(|err| fs_error(err, "failed to open staged file", entry.path()))?;
        io::copy(&mut source, &mut writer)
            .map_err(|err| fs_error(err, "failed to write archive entry", archive))?;
        entries += 1;
    }

    writer.finish().map_err(|err| zip_error(err, archive))?;
    debug!(archive = %archive.display(), entries, "wrote plugin archive");
    Ok(entries)
}

fn archive_entry_name(root: &Path, path: &Path) -> Result<String, Error> {
    let relative = path.strip_prefix(root).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("staged path escaped root")
            .with_source(err)
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn remove_if_exists(path: &Path) -> Result<Option<PathBuf>, Error> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(fs_error(err, "failed to inspect existing deployment", path)),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|err| fs_error(err, "failed to remove existing deployment", path))?;
    debug!(path = %path.display(), "removed previous deployment");
    Ok(Some(path.to_path_buf()))
}

fn fs_error(err: io::Error, message: &str, path: &Path) -> Error {
    Error::new(fs_error_kind(&err))
        .with_message(message.to_string())
        .with_path(path)
        .with_source(err)
}

fn zip_error(err: zip::result::ZipError, archive: &Path) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write archive")
        .with_path(archive)
        .with_source(err)
}
