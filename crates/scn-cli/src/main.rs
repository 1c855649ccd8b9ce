use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};

use scn_core::codec::{decode, encode_value, from_hex};
use scn_core::{
    ExportOptions, ImportOptions, ImportReport, MarkerPolicy, MemoryHost, NodeError, ProjectDesc,
    TypeTag,
};

#[derive(Parser, Debug)]
#[command(
    name = "scn-cli",
    about = "Inspect, validate and replay scene mapping files against the in-memory model",
    version
)]
struct Cli {
    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Parse and validate a mapping file, or every *.scene.json under a directory
    Check(CheckArgs),
    /// Import a mapping into an empty model and export it again
    Replay(ReplayArgs),
    /// Reconcile a target mapping into a model built from a base mapping
    Sync(SyncArgs),
    /// Get value at JSON pointer
    Get(GetArgs),
    /// Decode one blob and print the typed value
    Blob(BlobArgs),
}

#[derive(ClapArgs, Debug)]
struct CheckArgs {
    /// Mapping file or directory
    path: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct ReplayArgs {
    /// Mapping file to replay
    path: PathBuf,
    /// Write the re-exported mapping here
    #[arg(long)]
    out: Option<PathBuf>,
    /// Zip the existing output file before overwriting it
    #[arg(long, default_value_t = false, requires = "out")]
    backup: bool,
    /// Max property tree depth on export
    #[arg(long, default_value_t = 64)]
    max_depth: usize,
}

#[derive(ClapArgs, Debug)]
struct SyncArgs {
    /// Mapping the model is built from
    base: PathBuf,
    /// Mapping reconciled into the model
    target: PathBuf,
    /// Remove live markers the target does not describe
    #[arg(long, default_value_t = false)]
    replace_markers: bool,
    /// Keyframe/marker time tolerance in seconds
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,
    /// Write the resulting model's mapping here
    #[arg(long)]
    out: Option<PathBuf>,
    /// Max property tree depth on export
    #[arg(long, default_value_t = 64)]
    max_depth: usize,
}

#[derive(ClapArgs, Debug)]
struct GetArgs {
    /// JSON file to load
    path: PathBuf,
    /// JSON Pointer, e.g. /items/0/comp_data/layers/0
    #[arg(long)]
    ptr: String,
}

#[derive(ClapArgs, Debug)]
struct BlobArgs {
    /// Type tag, e.g. custom@1
    #[arg(long)]
    tag: String,
    /// Payload as hex
    #[arg(long)]
    hex: String,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    match cli.cmd {
        Cmd::Check(a) => cmd_check(a),
        Cmd::Replay(a) => cmd_replay(a),
        Cmd::Sync(a) => cmd_sync(a),
        Cmd::Get(a) => cmd_get(a),
        Cmd::Blob(a) => cmd_blob(a),
    }
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", msg);
    std::process::exit(2);
}

fn load(path: &Path) -> ProjectDesc {
    let desc = scn_core::load_project_file(path)
        .unwrap_or_else(|e| fail(format!("{}: {}", path.display(), e)));
    log::debug!("loaded {} ({} top-level items)", path.display(), desc.items.len());
    desc
}

fn print_errors(errors: &[NodeError]) {
    for e in errors {
        println!("  {}", e);
    }
}

fn print_report(report: &ImportReport) {
    let s = &report.stats;
    println!(
        "created {}, updated {}, removed {}, moved {}",
        s.created, s.updated, s.removed, s.moved
    );
    if report.cancelled {
        println!("cancelled");
    }
    print_errors(&report.errors);
}

fn cmd_check(args: CheckArgs) {
    let p = args.path.as_path();
    let files = if p.is_dir() {
        scn_core::find_scene_files(p).unwrap_or_else(|e| fail(e))
    } else if p.is_file() {
        vec![p.to_path_buf()]
    } else {
        fail(format!("not found: {}", p.display()))
    };
    let mut failed = false;
    for f in &files {
        let desc = match scn_core::load_project_file(f) {
            Ok(d) => d,
            Err(e) => {
                println!("{}: {}", f.display(), e);
                failed = true;
                continue;
            }
        };
        let errors = scn_core::validate_project(&desc);
        if errors.is_empty() {
            println!("{}: ok", f.display());
        } else {
            println!("{}: {} problems", f.display(), errors.len());
            print_errors(&errors);
            failed = true;
        }
    }
    if failed {
        std::process::exit(3);
    }
}

fn write_out(out: &Path, desc: &ProjectDesc, backup: bool) {
    if backup {
        match scn_core::snapshot_file(out) {
            Ok(Some(zip)) => println!("Backup: {}", zip.display()),
            Ok(None) => println!("Backup: nothing to keep, {} is new", out.display()),
            Err(e) => fail(format!("backup failed: {}", e)),
        }
    }
    if let Err(e) = scn_core::save_project_file(out, desc) {
        fail(e);
    }
    println!("Wrote {}", out.display());
}

fn cmd_replay(args: ReplayArgs) {
    let desc = load(&args.path);
    let mut host = MemoryHost::new();
    let report = scn_core::import_project(&mut host, &desc, ImportOptions::default());
    print_report(&report);

    let exported = scn_core::export_project(
        &host,
        ExportOptions {
            max_depth: args.max_depth,
        },
    );
    print_errors(&exported.errors);
    let same = exported.project == desc;
    println!("round trip: {}", if same { "identical" } else { "differs" });

    if let Some(out) = &args.out {
        write_out(out, &exported.project, args.backup);
    }
    if !same || !report.is_clean() || !exported.errors.is_empty() {
        std::process::exit(3);
    }
}

fn cmd_sync(args: SyncArgs) {
    let base = load(&args.base);
    let target = load(&args.target);
    let mut host = MemoryHost::new();
    let seeded = scn_core::import_project(&mut host, &base, ImportOptions::default());
    if !seeded.is_clean() {
        println!("base:");
        print_errors(&seeded.errors);
    }

    let opts = ImportOptions {
        marker_policy: if args.replace_markers {
            MarkerPolicy::Replace
        } else {
            MarkerPolicy::Merge
        },
        time_tolerance: args.tolerance,
    };
    let before = host.mutation_count();
    let report = scn_core::import_project(&mut host, &target, opts);
    println!("host writes: {}", host.mutation_count() - before);
    print_report(&report);

    if let Some(out) = &args.out {
        let exported = scn_core::export_project(
            &host,
            ExportOptions {
                max_depth: args.max_depth,
            },
        );
        print_errors(&exported.errors);
        write_out(out, &exported.project, false);
    }
    if !report.is_clean() {
        std::process::exit(3);
    }
}

fn cmd_get(args: GetArgs) {
    let v = scn_core::files::load_json_value(&args.path).unwrap_or_else(|e| fail(e));
    match v.pointer(&args.ptr) {
        Some(n) => match serde_json::to_string_pretty(n) {
            Ok(s) => println!("{}", s),
            Err(e) => fail(e),
        },
        None => fail(format!("pointer not found: {}", args.ptr)),
    }
}

fn cmd_blob(args: BlobArgs) {
    let tag: TypeTag = args.tag.parse().unwrap_or_else(|e| fail(e));
    let bytes = from_hex(&args.hex).unwrap_or_else(|e| fail(e));
    let value = decode(&bytes, tag).unwrap_or_else(|e| fail(e));
    println!("{:#?}", value);
    match serde_json::to_string(&encode_value(&value)) {
        Ok(s) => println!("{}", s),
        Err(e) => fail(e),
    }
}
