use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use ureq::AgentBuilder;
use walkdir::WalkDir;
use zip::read::ZipArchive;

const DEFAULT_PDFIUM_VERSION: &str = "7350";
const DEFAULT_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

const WATCHED_VARS: &[&str] = &[
    "READALONG_PDFIUM_SKIP_DOWNLOAD",
    "READALONG_PDFIUM_ARCHIVE_PATH",
    "READALONG_PDFIUM_VERSION",
    "READALONG_PDFIUM_PLATFORM",
    "READALONG_PDFIUM_BASE_URL",
    "PDFIUM_DYNAMIC_LIB_PATH",
    "PDFIUM_STATIC_LIB_PATH",
];

struct Fetch {
    staging: PathBuf,
    target_os: String,
    platform: String,
    version: String,
    base_url: String,
}

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=build.rs");
    for var in WATCHED_VARS {
        println!("cargo:rerun-if-env-changed={var}");
    }

    // Skipped on request, or when the user points pdfium-render at a library.
    if env::var_os("READALONG_PDFIUM_SKIP_DOWNLOAD").is_some()
        || env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some()
        || env::var_os("PDFIUM_STATIC_LIB_PATH").is_some()
    {
        return Ok(());
    }

    let fetch = Fetch::from_env()?;
    if let Some(library) = fetch.find_library() {
        return export_library_path(&library);
    }

    let archive = match env::var_os("READALONG_PDFIUM_ARCHIVE_PATH") {
        Some(path) => PathBuf::from(path),
        None => fetch.download()?,
    };
    unpack(&archive, &fetch.staging)?;

    let library = fetch
        .find_library()
        .with_context(|| format!("pdfium library not found in {:?}", fetch.staging))?;
    export_library_path(&library)
}

impl Fetch {
    fn from_env() -> Result<Self> {
        let out_dir = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR not set")?);
        let staging = out_dir.join("pdfium");
        fs::create_dir_all(&staging).context("failed to create pdfium staging directory")?;

        let target_os = env::var("CARGO_CFG_TARGET_OS").context("CARGO_CFG_TARGET_OS missing")?;
        let target_arch =
            env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH missing")?;
        let platform = env::var("READALONG_PDFIUM_PLATFORM")
            .unwrap_or_else(|_| platform_for(&target_os, &target_arch));

        Ok(Self {
            staging,
            target_os,
            platform,
            version: env::var("READALONG_PDFIUM_VERSION")
                .unwrap_or_else(|_| DEFAULT_PDFIUM_VERSION.to_owned()),
            base_url: env::var("READALONG_PDFIUM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned()),
        })
    }

    fn library_name(&self) -> &'static str {
        match self.target_os.as_str() {
            "windows" => "pdfium.dll",
            "macos" => "libpdfium.dylib",
            _ => "libpdfium.so",
        }
    }

    fn find_library(&self) -> Option<PathBuf> {
        let name = self.library_name();
        WalkDir::new(&self.staging)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
            .map(|entry| entry.into_path())
    }

    fn download(&self) -> Result<PathBuf> {
        let downloads = self.staging.join("downloads");
        fs::create_dir_all(&downloads).context("failed to create download cache")?;

        let agent = AgentBuilder::new()
            .timeout_read(Duration::from_secs(120))
            .timeout_write(Duration::from_secs(120))
            .build();

        let mut failures = Vec::new();
        for file_name in [
            format!("pdfium-{}.tgz", self.platform),
            format!("pdfium-{}.zip", self.platform),
        ] {
            let archive = downloads.join(&file_name);
            if archive.exists() {
                return Ok(archive);
            }
            let url = format!(
                "{}/chromium/{}/{}",
                self.base_url.trim_end_matches('/'),
                self.version,
                file_name
            );
            match agent.get(&url).call() {
                Ok(response) => {
                    let mut file = File::create(&archive)
                        .with_context(|| format!("failed to create {:?}", archive))?;
                    io::copy(&mut response.into_reader(), &mut file)
                        .with_context(|| format!("failed to write {:?}", archive))?;
                    return Ok(archive);
                }
                Err(err) => failures.push(format!("{url}: {err}")),
            }
        }

        Err(anyhow!(
            "failed to download pdfium {} for {}: {}",
            self.version,
            self.platform,
            failures.join("; ")
        ))
    }
}

fn platform_for(target_os: &str, target_arch: &str) -> String {
    let os = match target_os {
        "macos" => "mac",
        other => other,
    };
    let arch = match target_arch {
        "aarch64" => "arm64",
        "x86_64" => "x64",
        other => other,
    };
    format!("{os}-{arch}")
}

fn unpack(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive).with_context(|| format!("failed to open {:?}", archive))?;
    match archive.extension().and_then(|ext| ext.to_str()) {
        Some("tgz") | Some("gz") => Archive::new(GzDecoder::new(file))
            .unpack(destination)
            .with_context(|| format!("failed to unpack {:?}", archive)),
        Some("zip") => ZipArchive::new(file)
            .and_then(|mut zip| zip.extract(destination))
            .with_context(|| format!("failed to extract {:?}", archive)),
        _ => bail!("unsupported pdfium archive {:?}", archive),
    }
}

fn export_library_path(path: &Path) -> Result<()> {
    let path = path
        .to_str()
        .ok_or_else(|| anyhow!("pdfium path {:?} is not UTF-8", path))?;
    println!("cargo:rustc-env=READALONG_PDFIUM_LIBRARY_PATH={path}");
    Ok(())
}
