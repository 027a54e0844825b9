use std::path::Path;

use anyhow::{Context, bail};
use repack_pipeline::{Batch, Pipeline, RepackConfig, collect_inputs};
use repack_verify::{Finding, verify_archive};

use crate::cli::{Commands, ListArg, ProcessArg, VerifyArg};

/// Run one subcommand. `Ok(false)` means it ran but found failures.
pub fn run(cmd: Commands) -> anyhow::Result<bool> {
    match cmd {
        Commands::Process(arg) => process(arg),
        Commands::Verify(arg) => verify(arg),
        Commands::List(arg) => list(arg),
    }
}

fn load_config(arg: &ProcessArg) -> anyhow::Result<RepackConfig> {
    let mut config = match &arg.config {
        Some(path) => RepackConfig::from_path(path)?,
        None => RepackConfig::default(),
    };
    if let Some(output) = &arg.output {
        config.output_dir = output.clone();
    }
    if let Some(root) = &arg.work_root {
        config.work_root = Some(root.clone());
    }
    tracing::debug!(
        config = ?arg.config,
        output = %config.output_dir.display(),
        levels = config.schema.levels.len(),
        "loaded configuration"
    );
    Ok(config)
}

fn process(arg: ProcessArg) -> anyhow::Result<bool> {
    let config = load_config(&arg)?;
    let pipeline = Pipeline::from_config(&config).context("invalid marker configuration")?;

    let inputs = collect_inputs(&arg.input)?;
    if inputs.is_empty() {
        bail!("no .zip files found in '{}'", arg.input.display());
    }

    let report = Batch::new(&pipeline).run(&inputs);
    for outcome in &report.succeeded {
        println!(
            "ok    {} -> {} ({} signed, {} skipped)",
            outcome.input.display(),
            outcome.output.display(),
            outcome.leaves.len(),
            outcome.excluded.len()
        );
        for warning in &outcome.warnings {
            println!("      warning: {warning}");
        }
    }
    for failure in &report.failed {
        println!("fail  {failure}");
        for line in &failure.structure {
            println!("      {line}");
        }
    }
    println!(
        "{} of {} archives processed into '{}'",
        report.succeeded.len(),
        report.total(),
        pipeline.output_dir().display()
    );
    Ok(report.is_success())
}

fn verify(arg: VerifyArg) -> anyhow::Result<bool> {
    let report = verify_archive(&arg.archive)?;

    if arg.json {
        println!("{}", report.to_json()?);
        return Ok(report.is_ok());
    }

    let details = report.details();
    println!("{}: {} entries, {} bytes", arg.archive.display(), details.entry_count, details.file_size);
    print_findings("error", report.errors());
    print_findings("warning", report.warnings());
    println!("{}", if report.is_ok() { "valid" } else { "INVALID" });
    Ok(report.is_ok())
}

fn print_findings(level: &str, findings: &[Finding]) {
    for finding in findings {
        match &finding.entry {
            Some(entry) => println!("{level}: {entry}: {}", finding.message),
            None => println!("{level}: {}", finding.message),
        }
    }
}

fn list(arg: ListArg) -> anyhow::Result<bool> {
    let entries = list_entries(&arg.archive)?;
    for entry in &entries {
        println!(
            "{:>10} {:>10} {:08x}  {}",
            entry.size, entry.compressed_size, entry.crc32, entry.path
        );
    }
    println!("{} entries", entries.len());
    Ok(true)
}

fn list_entries(archive: &Path) -> anyhow::Result<Vec<repack_archive::Entry>> {
    repack_archive::list_entries(archive).with_context(|| format!("failed to list '{}'", archive.display()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use repack_archive::ArchiveWriter;

    use super::*;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Vec::new());
        for (name, data) in files {
            writer.add_file(name, data, None).unwrap();
        }
        writer.finish().unwrap().0
    }

    /// One level: every `*.pkg.zip` anywhere in the root is a leaf.
    fn flat_config(dir: &Path) -> PathBuf {
        let path = dir.join("repack.toml");
        std::fs::write(
            &path,
            "[marker]\nfile_name = \"SIGNED\"\ncontent = \"yes\\n\"\n\n\
             [[schema.levels]]\nname = \"root\"\ntargets = \"*.pkg.zip\"\nsearch = \"recursive\"\n",
        )
        .unwrap();
        path
    }

    fn process_arg(input: PathBuf, output: PathBuf, config: Option<PathBuf>) -> ProcessArg {
        ProcessArg {
            input,
            output: Some(output),
            config,
            work_root: None,
        }
    }

    #[test]
    fn process_with_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let inner = zip_bytes(&[("lib/a.txt", b"a")]);
        let input = dir.path().join("bundle.zip");
        std::fs::write(&input, zip_bytes(&[("pkgs/a.pkg.zip", &inner)])).unwrap();
        let output = dir.path().join("out");

        let arg = process_arg(input, output.clone(), Some(flat_config(dir.path())));
        assert!(process(arg).unwrap());

        let root = dir.path().join("check");
        repack_archive::extract(output.join("bundle.zip"), &root).unwrap();
        let leaf = dir.path().join("leaf");
        repack_archive::extract(root.join("pkgs/a.pkg.zip"), &leaf).unwrap();
        assert_eq!(std::fs::read_to_string(leaf.join("SIGNED")).unwrap(), "yes\n");
    }

    #[test]
    fn process_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.zip");
        std::fs::write(&input, b"not a zip").unwrap();

        let arg = process_arg(input, dir.path().join("out"), None);
        assert!(!process(arg).unwrap());
    }

    #[test]
    fn process_without_inputs_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let arg = process_arg(dir.path().to_path_buf(), dir.path().join("out"), None);
        assert!(process(arg).is_err());
    }

    #[test]
    fn cli_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut arg = process_arg(PathBuf::from("in.zip"), PathBuf::from("elsewhere"), Some(flat_config(dir.path())));
        arg.work_root = Some(PathBuf::from("/tmp/w"));

        let config = load_config(&arg).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("elsewhere"));
        assert_eq!(config.work_root, Some(PathBuf::from("/tmp/w")));
        assert_eq!(config.marker.file_name, "SIGNED");
    }

    #[test]
    fn verify_and_list_written_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        std::fs::write(&archive, zip_bytes(&[("docs/readme.txt", "readme ".repeat(20).as_bytes())])).unwrap();

        assert!(verify(VerifyArg { archive: archive.clone(), json: false }).unwrap());
        assert!(verify(VerifyArg { archive: archive.clone(), json: true }).unwrap());
        assert!(list(ListArg { archive }).unwrap());
    }

    #[test]
    fn verify_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.zip");
        std::fs::write(&archive, [0u8; 64]).unwrap();
        assert!(!verify(VerifyArg { archive, json: false }).unwrap());
    }
}
