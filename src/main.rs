use anypack::{
    AnyPack, Cli, Commands, ContentValue, DirectoryLoader, OutputFormatter, OutputMode, PackError,
    PackRequest, PackSummary, UnpackedArchive, UserFriendlyError,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        return handle_generate_config(output);
    }

    let mut anypack = match AnyPack::from_cli(&cli) {
        Ok(anypack) => anypack,
        Err(e) => {
            print_startup_error(&e);
            return 1;
        }
    };

    let result = match &cli.command {
        Commands::Pack {
            inputs,
            names,
            session,
            provenance,
            ..
        } => handle_pack(
            &mut anypack,
            inputs,
            names.as_deref(),
            session.as_deref(),
            provenance.as_deref(),
        ),
        Commands::Unpack {
            archive,
            list,
            output_dir,
        } => handle_unpack(&anypack, archive, *list, output_dir.as_deref()),
        Commands::GenerateConfig { .. } => unreachable!("handled above"),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            anypack.handle_error(&e);

            // Map error types to appropriate exit codes
            match e {
                PackError::InvalidPath { .. } => 2,
                PackError::ArchiveNotFound { .. } => 3,
                PackError::Config { .. } => 4,
                PackError::EmptyArchive => 6,
                PackError::Permission { .. } => 7,
                _ => 1, // General error
            }
        }
    }
}

fn handle_pack(
    anypack: &mut AnyPack,
    inputs: &[PathBuf],
    names: Option<&str>,
    session: Option<&str>,
    provenance: Option<&str>,
) -> Result<(), PackError> {
    let start = Instant::now();
    anypack.output_formatter().start_operation("Packing content");

    let loader = DirectoryLoader::new();
    let mut values = Vec::new();
    for input in inputs {
        values.push(loader.load_path(input)?);
    }

    let naming = match names {
        Some(raw) => serde_json::from_str(raw).map_err(|e| PackError::Config {
            message: format!("Invalid naming manifest JSON: {}", e),
        })?,
        None => serde_json::Value::Null,
    };

    // without an explicit session label, each invocation is its own session
    let seed = match session {
        Some(label) => serde_json::json!({ "session": label }),
        None => serde_json::json!({ "pid": process::id(), "inputs": inputs }),
    };

    let mut request = PackRequest::new(ContentValue::Collection(values))
        .with_naming(naming)
        .with_session_seed(seed);
    if let Some(provenance) = provenance {
        request = request.with_provenance(provenance);
    }

    let outcome = anypack.pack(request)?;

    let summary = PackSummary {
        archive_path: outcome.archive_path.display().to_string(),
        written_this_call: outcome.written_this_call,
        total_written: outcome.total_written,
        skipped: outcome.skipped.clone(),
        elapsed: start.elapsed(),
    };
    anypack.output_formatter().print_pack_summary(&summary);

    if let Some(notification) = &outcome.notification {
        anypack.output_formatter().success(&format!(
            "Created archive {} ({})",
            notification.filename,
            notification.location_kind.as_str()
        ));
    }

    Ok(())
}

fn handle_unpack(
    anypack: &AnyPack,
    archive: &Path,
    list: bool,
    output_dir: Option<&Path>,
) -> Result<(), PackError> {
    anypack
        .output_formatter()
        .start_operation("Extracting archive");

    let result = anypack.unpack(archive)?;

    if list {
        print_member_listing(anypack.output_formatter(), &result);
        return Ok(());
    }

    let target = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => {
            let stem = archive
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "unpacked".to_string());
            anypack
                .config()
                .storage
                .output_directory
                .join(format!("unpacked_{}", stem))
        }
    };
    materialize_unpacked(&result, &target)?;

    anypack.output_formatter().print_unpack_summary(&result);
    anypack
        .output_formatter()
        .success(&format!("Extracted into {}", target.display()));
    Ok(())
}

fn print_member_listing(formatter: &OutputFormatter, result: &UnpackedArchive) {
    formatter.print_header("Archive contents");
    for (ext, names) in &result.manifest {
        for name in names {
            println!("  {:>6}  {}", ext, name);
        }
    }
    formatter.print_unpack_summary(result);
}

/// Write recovered content to disk: images as PNG, audio as WAV (original
/// bytes when available), videos copied from their staged files, texts under
/// the member name carried in their header line.
fn materialize_unpacked(result: &UnpackedArchive, target: &Path) -> Result<(), PackError> {
    std::fs::create_dir_all(target)?;

    for (index, image) in result.images.iter().enumerate() {
        let bytes = image.encode_png(None)?;
        std::fs::write(target.join(format!("image_{:05}.png", index)), bytes)?;
    }

    for (index, audio) in result.audios.iter().enumerate() {
        let name = audio
            .member_name()
            .map(sanitize_flat_name)
            .unwrap_or_else(|| format!("audio_{:05}.wav", index));
        match audio.original_bytes() {
            Some(bytes) => std::fs::write(target.join(name), bytes)?,
            None => std::fs::write(target.join(name), audio.encode_wav()?)?,
        }
    }

    for (index, video) in result.videos.iter().enumerate() {
        let name = video
            .member_name()
            .map(sanitize_flat_name)
            .unwrap_or_else(|| format!("video_{:05}.{}", index, video.inferred_extension()));
        if let Some(source) = video.source_file() {
            std::fs::copy(source, target.join(name))?;
        }
    }

    for (index, text) in result.texts.iter().enumerate() {
        let (name, body) = match text.split_once('\n') {
            Some((name, body)) => (sanitize_flat_name(name), body),
            None => (format!("text_{:05}.txt", index), text.as_str()),
        };
        std::fs::write(target.join(name), body)?;
    }

    Ok(())
}

fn sanitize_flat_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

fn handle_generate_config(output: &Path) -> i32 {
    match AnyPack::generate_sample_config(output) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", output.display());
            println!("\nTo use this configuration:");
            println!("  anypack pack <inputs> --config {}", output.display());
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            eprintln!(
                "Failed to generate configuration file: {}",
                e.user_message()
            );
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn print_startup_error(error: &PackError) {
    // Create a basic formatter for startup errors
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_config_command() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let exit_code = handle_generate_config(&config_path);
        assert_eq!(exit_code, 0);
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[archive]"));
    }

    #[test]
    fn test_sanitize_flat_name() {
        assert_eq!(sanitize_flat_name("a/b.txt"), "a_b.txt");
        assert_eq!(sanitize_flat_name("plain.txt"), "plain.txt");
    }
}
