// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    duct::cmd,
    log::{info, warn, LevelFilter},
    nbm_file_manifest::{crc_for_file, FileManifestError},
    nbm_packaging::{
        dependency_graph::DependencyGraph,
        error::NbmError,
        rewriter::{NoValidation, ProjectValidator, RewriteConfig},
        spec_version::{increment_branch, increment_sticky, increment_trunk},
        update_tracking::{remove_localized, LedgerPolicy, TrackingDirectory, UPDATE_TRACKING_DIR},
    },
    std::path::{Path, PathBuf},
    thiserror::Error,
};

const REFRESH_DEPENDENCIES_ABOUT: &str = "\
Rewrite module dependencies in project.xml files.

Each positional argument is the path to a `nbproject/project.xml` file.
Dependencies are rewritten according to a YAML configuration file.

# YAML Configuration

refresh (optional) (map[string, string])
   Maps a code name base to its current specification version. Existing
   runtime dependencies on that module requiring an older specification
   version are raised to this version. Implementation version dependencies
   are never touched and versions are never lowered.

inject (optional) (list[map])
   Dependencies every module should have. Each entry has the keys:

   cnb (required) (string)
      Code name base of the dependency.
   specification_version (optional) (string)
      Minimum specification version to require.
   implementation (optional) (bool)
      Require an implementation version instead.

   Missing dependencies are added with build, compile and runtime parts.
   Existing dependencies gain missing parts. The descriptors of injected
   modules are never rewritten.

validate_command (optional) (list[string])
   Command to run in the project directory after each dependency edit.
   If it exits non-zero, that edit is taken back and the remaining edits
   are still tried. All failures are reported at the end.
";

const STRIP_LOCALE_ABOUT: &str = "\
Remove files of a locale from update tracking ledgers.

Entries whose path contains `_<locale>.` or `_<locale>/` or ends with
`_<locale>` are removed from every ledger in the directory. Changed ledgers
are rewritten. A ledger that cannot be processed is reported and the
remaining ledgers are still processed.
";

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Nbm(#[from] NbmError),

    #[error("{0}")]
    FileManifest(#[from] FileManifestError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("{0} modules have unsatisfied dependencies")]
    Inconsistent(usize),

    #[error("{0} tracked files are missing or modified")]
    TrackedFilesChanged(usize),

    #[error("{0} ledgers could not be processed")]
    LedgerFailures(usize),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, NbtError>;

/// Runs a command in the project directory of a rewritten descriptor.
struct CommandValidator {
    argv: Vec<String>,
}

impl ProjectValidator for CommandValidator {
    fn validate(&self, project_xml: &Path) -> nbm_packaging::error::Result<()> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| NbmError::Validation("validate_command is empty".to_string()))?;

        // Descriptors live in <project>/nbproject/project.xml.
        let dir = project_xml
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or_else(|| Path::new("."));

        info!("running {} in {}", self.argv.join(" "), dir.display());

        let output = cmd(program, args)
            .dir(dir)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()?;

        if output.status.success() {
            Ok(())
        } else {
            Err(NbmError::Validation(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stdout).trim()
            )))
        }
    }
}

fn ledger_policy(args: &ArgMatches) -> LedgerPolicy {
    if args.is_present("legacy") {
        LedgerPolicy::Legacy
    } else {
        LedgerPolicy::Strict
    }
}

fn path_arg(args: &ArgMatches, name: &str) -> PathBuf {
    args.value_of_os(name)
        .map(PathBuf::from)
        .unwrap_or_default()
}

fn path_args(args: &ArgMatches, name: &str) -> Vec<PathBuf> {
    args.values_of_os(name)
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default()
}

fn legacy_arg() -> Arg<'static> {
    Arg::new("legacy")
        .long("legacy")
        .help("Keep duplicate paths and emptied records as historical ledgers did")
}

fn app() -> Command<'static> {
    let app = Command::new("Module Build Tool")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Check module dependencies and maintain update tracking ledgers")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(
        Command::new("verify-consistency")
            .about("Report modules whose dependencies cannot be satisfied")
            .arg(
                Arg::new("token")
                    .long("token")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .help("Token provided by the runtime environment"),
            )
            .arg(
                Arg::new("update-tracking")
                    .long("update-tracking")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Check against versions recorded in this update_tracking directory"),
            )
            .arg(legacy_arg())
            .arg(
                Arg::new("manifest-dir")
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Directory containing module MANIFEST.MF files"),
            ),
    );

    let app = app.subcommand(
        Command::new("sort-modules")
            .about("Print modules in an order where dependencies come first")
            .arg(
                Arg::new("manifest-dir")
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Directory containing module MANIFEST.MF files"),
            ),
    );

    let app = app.subcommand(
        Command::new("refresh-dependencies")
            .about("Rewrite module dependencies in project.xml files")
            .long_about(REFRESH_DEPENDENCIES_ABOUT)
            .arg(
                Arg::new("yaml-config")
                    .long("yaml-config")
                    .takes_value(true)
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Path to a YAML file defining the rewrite configuration"),
            )
            .arg(
                Arg::new("project")
                    .required(true)
                    .multiple_values(true)
                    .allow_invalid_utf8(true)
                    .help("project.xml files to rewrite"),
            ),
    );

    let app = app.subcommand(
        Command::new("strip-locale")
            .about("Remove files of a locale from update tracking ledgers")
            .long_about(STRIP_LOCALE_ABOUT)
            .arg(
                Arg::new("locale")
                    .long("locale")
                    .takes_value(true)
                    .required(true)
                    .help("Locale suffix, such as `ja` or `zh_CN`"),
            )
            .arg(legacy_arg())
            .arg(
                Arg::new("dir")
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("update_tracking directory"),
            ),
    );

    let app = app.subcommand(
        Command::new("verify-tracking")
            .about("Verify files recorded in update tracking ledgers against a cluster")
            .arg(legacy_arg())
            .arg(
                Arg::new("cluster-dir")
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Cluster directory containing update_tracking/"),
            ),
    );

    let app = app.subcommand(
        Command::new("increment-version")
            .about("Print the next specification version")
            .arg(
                Arg::new("mode")
                    .long("mode")
                    .takes_value(true)
                    .possible_values(["trunk", "branch", "sticky"])
                    .default_value("trunk")
                    .help("How to increment"),
            )
            .arg(
                Arg::new("manifest-style")
                    .long("manifest-style")
                    .help("Use 2 segment versions as written in manifests"),
            )
            .arg(
                Arg::new("sticky-level")
                    .long("sticky-level")
                    .takes_value(true)
                    .default_value("1")
                    .help("Index of the segment to increment in sticky mode"),
            )
            .arg(
                Arg::new("spec-version")
                    .required(true)
                    .value_name("VERSION")
                    .help("Version to increment"),
            ),
    );

    app.subcommand(
        Command::new("crc")
            .about("Print CRC32 checksums of files as recorded in ledgers")
            .arg(
                Arg::new("path")
                    .required(true)
                    .multiple_values(true)
                    .allow_invalid_utf8(true)
                    .help("Files to checksum"),
            ),
    )
}

pub fn run_cli() -> Result<()> {
    let mut app = app();
    let matches = app.clone().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("verify-consistency", args)) => command_verify_consistency(args),
        Some(("sort-modules", args)) => command_sort_modules(args),
        Some(("refresh-dependencies", args)) => command_refresh_dependencies(args),
        Some(("strip-locale", args)) => command_strip_locale(args),
        Some(("verify-tracking", args)) => command_verify_tracking(args),
        Some(("increment-version", args)) => command_increment_version(args),
        Some(("crc", args)) => command_crc(args),
        Some((command, _)) => Err(NbtError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

fn command_verify_consistency(args: &ArgMatches) -> Result<()> {
    let mut graph = DependencyGraph::from_manifest_dir(path_arg(args, "manifest-dir"))?;

    if let Some(tokens) = args.values_of("token") {
        for token in tokens {
            graph.add_environment_token(token);
        }
    }

    if args.is_present("update-tracking") {
        let tracking =
            TrackingDirectory::load(path_arg(args, "update-tracking"), ledger_policy(args))?;
        graph.attach_tracking(&tracking);
    }

    let inconsistencies = graph.find_inconsistencies();

    for (cnb, problems) in &inconsistencies {
        println!("{}", cnb);
        for problem in problems {
            println!("    {}", problem);
        }
    }

    if inconsistencies.is_empty() {
        info!("{} modules are consistent", graph.modules().count());
        Ok(())
    } else {
        Err(NbtError::Inconsistent(inconsistencies.len()))
    }
}

fn command_sort_modules(args: &ArgMatches) -> Result<()> {
    let graph = DependencyGraph::from_manifest_dir(path_arg(args, "manifest-dir"))?;

    for cnb in graph.build_order()? {
        println!("{}", cnb);
    }

    Ok(())
}

fn command_refresh_dependencies(args: &ArgMatches) -> Result<()> {
    let f = std::fs::File::open(path_arg(args, "yaml-config"))?;
    let config: RewriteConfig = serde_yaml::from_reader(f)?;
    let rewriter = config.to_rewriter()?;

    let validator: Box<dyn ProjectValidator> = match &config.validate_command {
        Some(argv) => Box::new(CommandValidator { argv: argv.clone() }),
        None => Box::new(NoValidation),
    };

    let report = rewriter.rewrite_projects(&path_args(args, "project"), validator.as_ref());

    for (path, edits) in &report.rewritten {
        println!("{}", path.display());
        for edit in edits {
            println!("    {}", edit);
        }
    }

    report.into_result()?;

    Ok(())
}

fn command_strip_locale(args: &ArgMatches) -> Result<()> {
    let locale = args
        .value_of("locale")
        .expect("locale argument is required");

    let report = remove_localized(path_arg(args, "dir"), locale, ledger_policy(args))?;

    for path in &report.rewritten {
        println!("rewrote {}", path.display());
    }
    info!("removed {} entries", report.removed_entries);

    for (path, err) in &report.failures {
        warn!("{}: {}", path.display(), err);
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(NbtError::LedgerFailures(report.failures.len()))
    }
}

fn command_verify_tracking(args: &ArgMatches) -> Result<()> {
    let cluster = path_arg(args, "cluster-dir");
    let tracking = TrackingDirectory::load(cluster.join(UPDATE_TRACKING_DIR), ledger_policy(args))?;

    let problems = tracking.verify_files(&cluster)?;
    for problem in &problems {
        println!("{}", problem);
    }

    if problems.is_empty() {
        info!("{} modules verified", tracking.iter().count());
        Ok(())
    } else {
        Err(NbtError::TrackedFilesChanged(problems.len()))
    }
}

fn increment_version(
    mode: &str,
    version: &str,
    manifest_style: bool,
    sticky_level: usize,
) -> Result<String> {
    let next = match mode {
        "trunk" => increment_trunk(version, manifest_style)?,
        "branch" => increment_branch(version, manifest_style)?,
        "sticky" => increment_sticky(version, sticky_level)?,
        _ => return Err(NbtError::InvalidSubCommand(format!("increment mode {}", mode))),
    };

    Ok(next.to_string())
}

fn command_increment_version(args: &ArgMatches) -> Result<()> {
    let next = increment_version(
        args.value_of("mode").expect("mode has a default value"),
        args.value_of("spec-version").expect("version argument is required"),
        args.is_present("manifest-style"),
        args.value_of_t::<usize>("sticky-level")?,
    )?;

    println!("{}", next);

    Ok(())
}

fn command_crc(args: &ArgMatches) -> Result<()> {
    for path in path_args(args, "path") {
        println!("{} {}", crc_for_file(&path)?, path.display());
    }

    Ok(())
}
