use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use meridian_core::cidr::Ipv4Cidr;
use meridian_core::config::VpcConfig;
use meridian_core::interpreter::{ApplyOutcome, Interpreter, InterpreterConfig};
use meridian_core::plan::Plan;
use meridian_core::provider::{StaticZones, ZoneSource};
use meridian_core::resource::Resource;
use meridian_core::topology::{self, NetworkPlan, RouteTarget, SubnetKind};
use meridian_provider_aws::AwsProvider;

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Plan and provision a VPC topology", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to config file
        #[arg(default_value = VpcConfig::DEFAULT_FILE)]
        file: PathBuf,
    },
    /// Show the network layout and the resources it needs
    Plan {
        /// Path to config file
        #[arg(default_value = VpcConfig::DEFAULT_FILE)]
        file: PathBuf,

        /// Use these zones instead of querying the region
        #[arg(long, value_delimiter = ',')]
        zones: Option<Vec<String>>,

        /// Print the network plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create the resources of the network plan
    Apply {
        /// Path to config file
        #[arg(default_value = VpcConfig::DEFAULT_FILE)]
        file: PathBuf,

        /// Use these zones instead of querying the region
        #[arg(long, value_delimiter = ',')]
        zones: Option<Vec<String>>,

        /// Show what would be created without calling AWS
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file, zones, json } => run_plan(&file, zones, json).await,
        Commands::Apply {
            file,
            zones,
            dry_run,
        } => run_apply(&file, zones, dry_run).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(file: &Path) -> Result<VpcConfig, String> {
    VpcConfig::load(file).map_err(|e| format!("{}: {}", file.display(), e))
}

/// Zones from the command line, or the available zones of the configured region
async fn resolve_zones(config: &VpcConfig, zones: Option<Vec<String>>) -> Result<Vec<String>, String> {
    let zones = match zones {
        Some(zones) => StaticZones(zones).available_zones().await,
        None => {
            AwsProvider::new(&config.region)
                .await
                .available_zones()
                .await
        }
    };
    let zones = zones.map_err(|e| format!("Failed to resolve availability zones: {}", e))?;
    log::debug!("Using zones {:?}", zones);
    Ok(zones)
}

fn run_validate(file: &Path) -> Result<(), String> {
    let config = load_config(file)?;

    println!("{}", "Validating...".cyan());

    let request = config.to_request();
    let counts = topology::ResolvedCounts::resolve(&request, request.az_count);
    request
        .layout
        .check(counts.public_count, counts.private_count)
        .map_err(|e| e.to_string())?;

    for warning in validation_warnings(&config) {
        println!("{}", format!("Warning: {}", warning).yellow());
    }

    println!(
        "{}",
        format!("✓ VPC '{}' ({}) is valid.", config.name, config.cidr_block)
            .green()
            .bold()
    );
    println!(
        "  • {} zones, {} public / {} private subnets, NAT per private subnet: {}",
        config.az_count, config.public_subnets, config.private_subnets, config.nat_per_private_subnet
    );

    Ok(())
}

/// Problems that do not stop planning but deserve attention
fn validation_warnings(config: &VpcConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Ok(cidr) = Ipv4Cidr::parse(&config.cidr_block)
        && !cidr.has_room_for_subnets()
    {
        warnings.push(format!(
            "CIDR block {} is narrower than /{}; derived /24 subnets fall outside it",
            cidr,
            Ipv4Cidr::MAX_PARENT_PREFIX
        ));
    }
    warnings
}

async fn run_plan(file: &Path, zones: Option<Vec<String>>, json: bool) -> Result<(), String> {
    let config = load_config(file)?;
    let zones = resolve_zones(&config, zones).await?;

    let request = config.to_request();
    let network = topology::plan(&request, &zones).map_err(|e| e.to_string())?;

    if json {
        let output = serde_json::to_string_pretty(&network)
            .map_err(|e| format!("Failed to serialize plan: {}", e))?;
        println!("{}", output);
        return Ok(());
    }

    print_network(&config, &network);
    println!();
    print_plan(&Plan::for_network(&config.name, &request, &network));
    Ok(())
}

async fn run_apply(file: &Path, zones: Option<Vec<String>>, dry_run: bool) -> Result<(), String> {
    let config = load_config(file)?;
    let zones = resolve_zones(&config, zones).await?;

    let request = config.to_request();
    let network = topology::plan(&request, &zones).map_err(|e| e.to_string())?;
    let plan = Plan::for_network(&config.name, &request, &network);

    print_network(&config, &network);
    println!();
    print_plan(&plan);
    println!();

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let provider = AwsProvider::new(&config.region).await;
    let interpreter = Interpreter::new(provider).with_config(InterpreterConfig {
        dry_run,
        continue_on_error: false,
    });
    let result = interpreter.apply(&plan).await;

    for (id, outcome) in &result.outcomes {
        match outcome {
            Ok(ApplyOutcome::Created { state }) => match &state.identifier {
                Some(identifier) => println!("  {} Create {} ({})", "✓".green(), id, identifier),
                None => println!("  {} Create {}", "✓".green(), id),
            },
            Ok(ApplyOutcome::Skipped { reason }) => {
                println!("  {} Create {} - {}", "-".normal(), id, reason)
            }
            Err(e) => println!("  {} Create {} - {}", "✗".red(), id, e),
        }
    }

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} resources processed.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

fn print_network(config: &VpcConfig, network: &NetworkPlan) {
    println!(
        "{}",
        format!("Network: {} ({}, {})", config.name, config.cidr_block, config.region)
            .cyan()
            .bold()
    );
    println!();

    for subnet in &network.subnets {
        let route = network
            .route_for(subnet.kind, subnet.index)
            .and_then(|r| r.default_route);
        let target = match route {
            Some(RouteTarget::InternetGateway) => "internet gateway".normal(),
            Some(RouteTarget::NatGateway { index }) => format!("NAT gateway {}", index + 1).normal(),
            None => "no egress".yellow(),
        };
        let kind = match subnet.kind {
            SubnetKind::Public => "public ".green(),
            SubnetKind::Private => "private".blue(),
        };
        println!(
            "  {} {:>2}  {:<18} {:<16} -> {}",
            kind,
            subnet.index + 1,
            subnet.cidr.to_string(),
            subnet.zone,
            target
        );
    }

    for nat in &network.nat_gateways {
        println!(
            "  {} {:>2}  in public subnet {}",
            "nat    ".magenta(),
            nat.index + 1,
            nat.attached_public_subnet_index + 1
        );
    }

    let isolated = network.isolated_subnets();
    if !isolated.is_empty() {
        println!();
        println!(
            "{}",
            format!(
                "Warning: {} private subnet(s) have no NAT gateway and no egress.",
                isolated.len()
            )
            .yellow()
        );
    }
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "Nothing to create.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for resource in plan.resources() {
        println!("  {} {}", "+".green().bold(), format_resource(resource));
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn format_resource(resource: &Resource) -> String {
    let refs = resource.references();
    if refs.is_empty() {
        resource.id.to_string()
    } else {
        format!("{} {}", resource.id, format!("(after {})", refs.join(", ")).dimmed())
    }
}
