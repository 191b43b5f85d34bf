use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tabmig::cli::{self, MigrateArgs};
use tabmig::config::MigrationOptions;

#[derive(Parser)]
#[command(name = "tabmig")]
#[command(about = "Migrate Tableau workbooks to Power BI projects")]
#[command(long_about = "Tabmig - Tableau workbook to Power BI project migration

Reads a .twb or packaged .twbx workbook, extracts data sources,
calculated fields, worksheets and dashboards, translates calculations
to DAX measures, and writes them into a PBIP project cloned from a
template.

COMMANDS:
  extract    - Show (and optionally save) workbook metadata
  translate  - Translate calculated fields to DAX
  deps       - Show calculations in dependency order
  migrate    - Clone a template project and inject measures

EXAMPLES:
  tabmig extract sales.twbx -o metadata.json
  tabmig translate sales.twbx --report report.json
  tabmig migrate sales.twbx template.pbip out.pbip --pages

LOGGING:
  RUST_LOG=tabmig=debug tabmig migrate ...   # or pass --verbose")]
#[command(version)]
struct Cli {
    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that translates formulas
#[derive(Args, Debug, Clone)]
struct OptionArgs {
    /// YAML file with migration options
    #[arg(short, long, env = "TABMIG_CONFIG")]
    config: Option<PathBuf>,

    /// Match field names ignoring case
    #[arg(long)]
    case_insensitive: bool,

    /// Display format for new measures
    #[arg(long)]
    format_string: Option<String>,
}

impl OptionArgs {
    /// Config file values, overridden by flags
    fn resolve(&self) -> anyhow::Result<MigrationOptions> {
        let mut options = match &self.config {
            Some(path) => MigrationOptions::load(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => MigrationOptions::default(),
        };
        if self.case_insensitive {
            options.case_insensitive_fields = true;
        }
        if let Some(format_string) = &self.format_string {
            options.format_string = format_string.clone();
        }
        Ok(options)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract workbook metadata
    Extract {
        /// Workbook (.twb or .twbx)
        workbook: PathBuf,

        /// Write the metadata as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(long_about = "Translate every calculated field to DAX.

Each calculation is reported on its own line. Calculations that cannot
be translated safely (level-of-detail expressions, table calculations,
unmapped functions) are listed with the reason; they never abort the
others.")]
    /// Translate calculated fields to DAX
    Translate {
        /// Workbook (.twb or .twbx)
        workbook: PathBuf,

        /// Write the translation report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Show calculations in dependency order
    Deps {
        /// Workbook (.twb or .twbx)
        workbook: PathBuf,

        #[command(flatten)]
        options: OptionArgs,
    },

    #[command(long_about = "Migrate a workbook into a Power BI project.

The output folder is replaced by a fresh copy of the template on every
run. Translated measures go into the first table of the semantic model
unless --table or --match-datasource says otherwise.

TEMPLATE LAYOUTS:
  <project>/definition/model.bim
  <project>/model.bim
  <project>/<name>.SemanticModel/model.bim

EXAMPLE:
  tabmig migrate sales.twbx template.pbip out.pbip --table Orders --pages")]
    /// Clone a template project and inject translated measures
    Migrate {
        /// Workbook (.twb or .twbx)
        workbook: PathBuf,

        /// Template project folder
        template: PathBuf,

        /// Output project folder (replaced if it exists)
        output: PathBuf,

        /// Destination table for all measures
        #[arg(short, long)]
        table: Option<String>,

        /// Put each measure in the table named after its data source
        #[arg(long)]
        match_datasource: bool,

        /// Write the translation report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Add one report page per worksheet
        #[arg(long)]
        pages: bool,

        #[command(flatten)]
        options: OptionArgs,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tabmig=debug" } else { "tabmig=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Extract { workbook, output } => cli::extract(workbook, output),
        Commands::Translate {
            workbook,
            report,
            options,
        } => cli::translate(workbook, report, options.resolve()?),
        Commands::Deps { workbook, options } => cli::deps(workbook, options.resolve()?),
        Commands::Migrate {
            workbook,
            template,
            output,
            table,
            match_datasource,
            report,
            pages,
            options,
        } => {
            let mut options = options.resolve()?;
            if table.is_some() {
                options.target_table = table;
            }
            if match_datasource {
                options.match_datasource_tables = true;
            }
            cli::migrate(MigrateArgs {
                workbook,
                template,
                output,
                options,
                report,
                pages,
            })
        }
    }
}
