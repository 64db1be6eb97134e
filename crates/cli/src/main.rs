use std::{
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
    time::Instant,
};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use stream::Stream;
use support::constants::HTTPFILE_UPLOAD_TMP_DIR;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use upload::{
    collect_uploaded_files, DynUploadHost, HostUploads, StagedFile, UploadSettings,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open a file as a stream and print what the stream reports about it.
    Inspect {
        path: PathBuf,
        #[arg(short, long, default_value = "r")]
        mode: String,
    },
    /// Run a command and print its output, read through a pipe stream.
    Exec {
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Stage local files as uploads under one form field and move them into `dest`.
    Upload {
        dest: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "files")]
        field: String,
        #[arg(
            short,
            long,
            help = format!("Upload settings file (toml), {HTTPFILE_UPLOAD_TMP_DIR} overrides its tmp_dir")
        )]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    match args.cmd {
        Commands::Inspect { path, mode } => inspect(&path, &mode),
        Commands::Exec { command } => exec(&command),
        Commands::Upload {
            dest,
            files,
            field,
            config,
        } => upload(&dest, &files, &field, config.as_deref()),
    }
}

fn inspect(path: &Path, mode: &str) -> Result<(), anyhow::Error> {
    let mut stream = Stream::open(path, mode)?;

    let report = json!({
        "size": stream.size()?,
        "pipe": stream.is_pipe(),
        "readable": stream.is_readable(),
        "writable": stream.is_writable(),
        "seekable": stream.is_seekable(),
        "metadata": stream.metadata(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    stream.close()?;
    Ok(())
}

fn exec(command: &[String]) -> Result<(), anyhow::Error> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("missing command"))?;

    let mut stream = Stream::spawn(Command::new(program).args(args), "r")?;
    let output = stream.contents()?;
    stream.close()?;

    print!("{}", String::from_utf8_lossy(&output));
    Ok(())
}

fn upload(
    dest: &Path,
    files: &[PathBuf],
    field: &str,
    config: Option<&Path>,
) -> Result<(), anyhow::Error> {
    let now = Instant::now();

    let settings = match config {
        Some(config) => UploadSettings::load_from_toml(config)
            .with_context(|| format!("loading upload settings from {}", config.display()))?,
        None => UploadSettings::default(),
    };
    info!("staging uploads in {}", settings.tmp_dir().display());

    let contents = files
        .iter()
        .map(|path| std::fs::read(path).with_context(|| format!("reading {}", path.display())))
        .collect::<Result<Vec<_>, _>>()?;
    let names: Vec<_> = files
        .iter()
        .map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .collect();
    let staged: Vec<_> = names
        .iter()
        .zip(&contents)
        .map(|(name, contents)| StagedFile {
            client_filename: name.as_deref(),
            media_type: None,
            contents,
        })
        .collect();

    let uploads = Arc::new(HostUploads::new(settings));
    let entry = match staged.as_slice() {
        [single] => uploads.stage(single),
        many => uploads.stage_all(many),
    };
    let raw = json!({ field: entry });

    let host: DynUploadHost = uploads;
    let mut uploaded = collect_uploaded_files(None, Some(&raw), &host)?;

    let mut moved = 0;
    for (field, file) in uploaded.flatten_mut() {
        if !file.error().is_ok() {
            warn!("skipping {}: {}", field, file.error());
            continue;
        }

        // the client name is untrusted, keep only its last component
        let name = file
            .client_filename()
            .and_then(|name| Path::new(name).file_name())
            .map(|name| name.to_os_string())
            .ok_or_else(|| anyhow!("upload {field} has no usable file name"))?;
        let target = dest.join(name);

        file.move_to(&target)?;
        println!("{} -> {}", field, target.display());
        moved += 1;
    }

    let elapsed = now.elapsed();
    info!("moved {} of {} uploads in {:.2?}", moved, files.len(), elapsed);
    Ok(())
}
