use charge_mix::{
    BlendReport, BlendStatus, BoundUnits, ChargeMixOptimizer, ChargeRequest, EvaluationMode, Optimization,
    OptimizerConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "charge-mix")]
#[command(about = "Least-cost furnace charge mix optimization", long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize the charge described by a JSON request
    Solve {
        /// The request file
        file: PathBuf,
        #[command(flatten)]
        options: ConfigArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Show binding constraints, reduced costs and violations
        #[arg(short, long)]
        analysis: bool,
    },
    /// Validate a JSON request without solving it
    Check {
        /// The request file
        file: PathBuf,
        #[command(flatten)]
        options: ConfigArgs,
    },
    /// Print the linear program built for a request
    Lp {
        /// The request file
        file: PathBuf,
        #[command(flatten)]
        options: ConfigArgs,
    },
    /// Print the built-in reference request as JSON
    Sample,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Widen targets by this factor if the exact problem is infeasible
    #[arg(long)]
    relax: Option<f64>,
    /// Derived property evaluation mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// Interpret material bounds as fractions of the furnace
    #[arg(long)]
    fractions: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Average,
    Absolute,
}

impl From<Mode> for EvaluationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Average => EvaluationMode::Average,
            Mode::Absolute => EvaluationMode::Absolute,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Solve { file, options, json, analysis } => {
            let request = read_request(&file);
            let optimizer = ChargeMixOptimizer::new(load_config(&options));

            let optimization = match optimizer.optimize(&request) {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            if json {
                match serde_json::to_string_pretty(&optimization) {
                    Ok(s) => println!("{}", s),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                print_optimization(&request, &optimization, analysis);
            }

            if !optimization.is_feasible() {
                std::process::exit(1);
            }
        }
        Commands::Check { file, options } => {
            let request = read_request(&file);
            let config = load_config(&options);

            match request.validate(&config) {
                Ok(input) => {
                    println!("✓ {} is valid", file.display());
                    println!("  {} raw materials", input.num_materials());
                    println!("  {} elements", input.elements.len());
                    println!("  {} element targets", input.element_targets.len());
                    println!("  {} property targets", input.property_targets.len());
                    println!("  furnace size {} {}", input.furnace_size, config.display.mass_unit);
                }
                Err(e) => {
                    eprintln!("✗ {} has errors:", file.display());
                    eprintln!("  {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Lp { file, options } => {
            let request = read_request(&file);
            let optimizer = ChargeMixOptimizer::new(load_config(&options));

            let lp = match optimizer.build(&request) {
                Ok(lp) => lp,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match serde_json::to_string_pretty(&lp) {
                Ok(s) => println!("{}", s),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Sample => match ChargeRequest::sample().to_json_pretty() {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_request(file: &Path) -> ChargeRequest {
    match ChargeRequest::from_json_file(file) {
        Ok(r) => {
            tracing::debug!(event = "request_loaded", file = %file.display(), materials = r.materials.len());
            r
        }
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            std::process::exit(1);
        }
    }
}

/// Configuration file first, then command line overrides
fn load_config(options: &ConfigArgs) -> OptimizerConfig {
    let mut config = match &options.config {
        Some(path) => match OptimizerConfig::from_toml_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => OptimizerConfig::default(),
    };

    if let Some(factor) = options.relax {
        config = config.with_relaxation(factor);
    }
    if let Some(mode) = options.mode {
        config = config.with_mode(mode.into());
    }
    if options.fractions {
        config = config.with_bound_units(BoundUnits::Fraction);
    }
    config
}

fn print_optimization(request: &ChargeRequest, optimization: &Optimization, analysis: bool) {
    let report = &optimization.report;
    let units = &report.units;

    println!("Furnace size: {} {}", request.furnace_size, units.mass_unit);
    println!("Property mode: {}", report.mode);
    println!("Attempt: {}", optimization.attempt);
    if let Some(ref diagnostic) = optimization.exact_diagnostic {
        println!("Exact attempt: {}", diagnostic);
    }
    println!();

    match report.status {
        BlendStatus::Optimal => print_blend(report, analysis),
        BlendStatus::Infeasible => {
            println!("Status: INFEASIBLE");
            print_diagnostic(report, analysis);
        }
        BlendStatus::NumericalFailure => {
            println!("Status: NUMERICAL FAILURE");
            print_diagnostic(report, analysis);
        }
    }

    if let Some(ref guidance) = optimization.guidance {
        println!();
        println!("{}", guidance);
    }

    if analysis && optimization.is_relaxed() {
        println!();
        println!("Relaxed targets:");
        for t in &optimization.targets {
            println!("  {:20} {:10.4} .. {:10.4}", t.property, t.min, t.max);
        }
    }
}

fn print_blend(report: &BlendReport, analysis: bool) {
    let Some(ref result) = report.result else {
        return;
    };
    let units = &report.units;

    println!("Status: OPTIMAL");
    println!("Total cost: {:.2}", result.total_cost);
    println!();
    println!("Charge:");
    for m in &result.materials {
        println!(
            "  {:20} {:10.4} {} {:12.2} {} ({:6.2}%)  cost {:10.2}",
            m.name, m.mass, units.mass_unit, m.secondary_mass, units.secondary_unit, m.share, m.cost
        );
    }

    println!();
    println!("Composition:");
    for (element, pct) in &result.average_composition {
        let mass = result.absolute_composition.get(element).copied().unwrap_or(0.0);
        println!("  {:20} {:8.4}%  ({:.4} {})", element, pct, mass, units.mass_unit);
    }

    if !result.properties.is_empty() {
        println!();
        println!("Properties:");
        for (name, value) in &result.properties {
            println!("  {:20} {:10.2}", name, value);
        }
    }

    if analysis && !result.binding_constraints.is_empty() {
        println!();
        println!("Binding constraints (pinch points):");
        for name in &result.binding_constraints {
            println!("  - {}", name);
        }
    }

    if analysis {
        println!();
        println!("Reduced costs (materials not in the charge):");
        for rc in &result.reduced_costs {
            if !rc.is_basic && rc.reduced_cost.abs() > 0.001 {
                println!(
                    "  {:20} cost must decrease by {:.2} to enter the charge",
                    rc.variable, rc.reduced_cost
                );
            }
        }
    }
}

fn print_diagnostic(report: &BlendReport, analysis: bool) {
    if let Some(ref diagnostic) = report.diagnostic {
        println!("{}", diagnostic);
    }

    if analysis && !report.violations.is_empty() {
        println!();
        println!("Violated constraints:");
        for v in &report.violations {
            println!("  {:30} {}", v.constraint, v.description);
        }
    }
}
