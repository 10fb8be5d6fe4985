//! Campus ETL CLI - load student, course and enrollment tables
//!
//! # Main Commands
//!
//! ```bash
//! campus-etl run --source data/students.csv              # Full ETL run
//! campus-etl run --source data/courses.json --type json --record-type courses
//! campus-etl run --source SHEET_ID --type google-sheet --dry-run
//! campus-etl init-db --database campus.db                # Create schema + departments
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! campus-etl parse data/students.csv                     # Just extract to JSON
//! ```

use campus_etl::config::Settings;
use campus_etl::extract::{Extract, Format, Source};
use campus_etl::logging::{init_logging, LOG_FILE};
use campus_etl::{
    LoadStrategy, Pipeline, PipelineOptions, PipelineReport, RecordType, RunMode, Store,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "campus-etl")]
#[command(about = "Validate, normalize and load campus data into the student database", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceType {
    Csv,
    Json,
    Url,
    GoogleSheet,
}

#[derive(Clone, Copy, ValueEnum)]
enum BodyFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline: extract, transform, load
    Run {
        /// Data source (file path, URL, or Google Sheet ID)
        #[arg(short, long)]
        source: String,

        /// Type of data source
        #[arg(short = 't', long = "type", value_enum, default_value = "csv")]
        source_type: SourceType,

        /// Body format for URL sources
        #[arg(long, value_enum, default_value = "csv")]
        format: BodyFormat,

        /// Sheet tab id for Google Sheet sources
        #[arg(long)]
        gid: Option<String>,

        /// What the table contains (students, courses, enrollments)
        #[arg(short, long, default_value = "students")]
        record_type: RecordType,

        /// Database URL (overrides DATABASE_URL)
        #[arg(short, long)]
        database: Option<String>,

        /// Records per committed batch (overrides ETL_BATCH_SIZE)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Bulk insert without conflict resolution (cold loads only)
        #[arg(long)]
        bulk: bool,

        /// Extract and transform only; never touch the database
        #[arg(long)]
        dry_run: bool,

        /// Write the full run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Create the schema and seed the department table
    InitDb {
        /// Database URL (overrides DATABASE_URL)
        #[arg(short, long)]
        database: Option<String>,
    },

    /// Extract a file and output its rows as JSON
    Parse {
        /// Input CSV or JSON file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = run_cli(cli);
    std::process::exit(code);
}

fn run_cli(cli: Cli) -> i32 {
    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            return 1;
        }
    };

    // Held until this function returns so the file log is flushed.
    let _guard = match init_logging(&settings.log_dir, cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("⚠️  File logging disabled: {}", e);
            None
        }
    };

    let result = match cli.command {
        Commands::Run {
            source,
            source_type,
            format,
            gid,
            record_type,
            database,
            batch_size,
            bulk,
            dry_run,
            report,
        } => {
            let options = RunArgs {
                source,
                source_type,
                format,
                gid,
                record_type,
                database,
                batch_size,
                bulk,
                dry_run,
                report,
            };
            cmd_run(options, settings)
        }

        Commands::InitDb { database } => cmd_init_db(database, settings).map(|_| 0),

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()).map(|_| 0),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            1
        }
    }
}

struct RunArgs {
    source: String,
    source_type: SourceType,
    format: BodyFormat,
    gid: Option<String>,
    record_type: RecordType,
    database: Option<String>,
    batch_size: Option<usize>,
    bulk: bool,
    dry_run: bool,
    report: Option<PathBuf>,
}

fn build_source(args: &RunArgs, timeout: Duration) -> Source {
    match args.source_type {
        SourceType::Csv => Source::Csv(PathBuf::from(&args.source)),
        SourceType::Json => Source::Json(PathBuf::from(&args.source)),
        SourceType::Url => Source::Url {
            url: args.source.clone(),
            format: match args.format {
                BodyFormat::Csv => Format::Csv,
                BodyFormat::Json => Format::Json,
            },
            timeout,
        },
        SourceType::GoogleSheet => Source::GoogleSheet {
            sheet_id: args.source.clone(),
            gid: args.gid.clone(),
            timeout,
        },
    }
}

fn cmd_run(args: RunArgs, settings: Settings) -> Result<i32, Box<dyn std::error::Error>> {
    let settings = settings
        .with_database(args.database.clone())
        .with_batch_size(args.batch_size)?;

    let source = build_source(&args, settings.http_timeout);
    let options = PipelineOptions {
        record_type: args.record_type,
        mode: if args.dry_run { RunMode::DryRun } else { RunMode::Full },
        strategy: if args.bulk { LoadStrategy::Bulk } else { LoadStrategy::Upsert },
        batch_size: settings.batch_size,
    };

    eprintln!("📄 Source: {}", source.describe());
    eprintln!("   Record type: {}", args.record_type);

    let report = if args.dry_run {
        eprintln!("\n*** DRY RUN MODE - No data will be loaded to database ***\n");
        Pipeline::new(&source, options).run()
    } else {
        // Without a database the load phase fails as not configured.
        let mut store = settings.database_url.as_deref().map(Store::open).transpose()?;
        if let Some(store) = &store {
            store.bootstrap()?;
        }
        let mut pipeline = Pipeline::new(&source, options);
        if let Some(store) = store.as_mut() {
            pipeline = pipeline.with_store(store);
        }
        pipeline.run()
    };

    print_summary(&report, &settings.log_dir);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)?;
        eprintln!("💾 Report written to: {}", path.display());
    }

    Ok(report.exit_code())
}

fn print_summary(report: &PipelineReport, log_dir: &Path) {
    println!("\n{}", "=".repeat(50));
    if report.succeeded() {
        println!("✅ PIPELINE SUMMARY");
    } else {
        println!("❌ PIPELINE SUMMARY");
    }
    println!("{}", "=".repeat(50));
    println!("Run: {}", report.run_id);
    println!("State: {}", report.state);
    println!("Duration: {:.2} seconds", report.duration_seconds);
    println!("Extracted: {} records", report.extract_count);
    println!("Transformed: {} records", report.transform_count);
    println!("Validation issues: {}", report.validation.total_errors());

    if let Some(ls) = &report.load_stats {
        println!(
            "Loaded: {} inserted, {} updated, {} failed",
            ls.inserted, ls.updated, ls.failed
        );
        for failure in ls.errors.iter().take(10) {
            println!("  row {} ({}): {}", failure.row, failure.key, failure.reason);
        }
        if ls.errors.len() > 10 {
            println!("  ... and {} more", ls.errors.len() - 10);
        }
    }

    if !report.errors.is_empty() {
        println!("\nERRORS ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [{}] {}", err.phase, err.error);
        }
    }

    println!("\nLog file: {}", log_dir.join(LOG_FILE).display());
}

fn cmd_init_db(database: Option<String>, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let settings = settings.with_database(database);
    let url = settings
        .database_url
        .ok_or(campus_etl::LoadError::NotConfigured)?;

    eprintln!("🗄️  Initializing database: {}", url);
    let store = Store::open(&url)?;
    if !store.ping() {
        return Err(format!("database at {} did not answer", url).into());
    }
    store.init_schema()?;
    let added = store.seed_departments()?;
    eprintln!("   Departments added: {}", added);
    eprintln!("✅ Database ready");
    Ok(())
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let is_json = input
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let source = if is_json {
        Source::Json(input.to_path_buf())
    } else {
        Source::Csv(input.to_path_buf())
    };
    let table = source.extract()?;

    eprintln!("   Columns: {}", table.headers.join(", "));
    eprintln!("✅ Parsed {} records", table.len());

    let json = serde_json::to_string_pretty(&table.rows)?;
    write_output(&json, output)?;
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
