/// Query runner — loads a network from RON and prints posteriors.
///
/// Usage: bn_query --network <file.ron> [--query <preset>] [--observe <node>=<state>]...
///                 [--target <node>]... [--approx <iterations>] [--seed <seed>]

use bayes_engine::core::query::Query;
use bayes_engine::core::sampler::SamplerConfig;
use bayes_engine::schema::network_def::NetworkDef;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: bn_query --network <file.ron> [--query <preset>] \
[--observe <node>=<state>]... [--target <node>]... [--approx <iterations>] [--seed <seed>]";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut network_path = None;
    let mut preset = None;
    let mut observations: Vec<(String, String)> = Vec::new();
    let mut targets: Vec<String> = Vec::new();
    let mut iterations: Option<usize> = None;
    let mut seed: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--network" if i + 1 < args.len() => {
                i += 1;
                network_path = Some(args[i].clone());
            }
            "--query" if i + 1 < args.len() => {
                i += 1;
                preset = Some(args[i].clone());
            }
            "--observe" if i + 1 < args.len() => {
                i += 1;
                match args[i].split_once('=') {
                    Some((node, state)) => observations.push((node.to_string(), state.to_string())),
                    None => {
                        eprintln!("ERROR: --observe expects <node>=<state>, got '{}'", args[i]);
                        process::exit(1);
                    }
                }
            }
            "--target" if i + 1 < args.len() => {
                i += 1;
                targets.push(args[i].clone());
            }
            "--approx" if i + 1 < args.len() => {
                i += 1;
                iterations = Some(parse_number(&args[i], "--approx"));
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = Some(parse_number(&args[i], "--seed"));
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("{}", USAGE);
                process::exit(1);
            }
        }
        i += 1;
    }

    let network_path = match network_path {
        Some(path) => path,
        None => {
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    // 1. Load and build the network
    let def = match NetworkDef::load_from_ron(Path::new(&network_path)) {
        Ok(def) => def,
        Err(e) => {
            eprintln!("ERROR: Failed to load {}: {}", network_path, e);
            process::exit(1);
        }
    };
    let mut network = match def.build() {
        Ok(network) => network,
        Err(e) => {
            eprintln!("ERROR: Failed to build {}: {}", network_path, e);
            process::exit(1);
        }
    };

    // 2. Apply command-line evidence
    for (node, state) in &observations {
        if let Err(e) = network.observe(node, state) {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    }

    // 3. Configure the query
    let mut query = match &preset {
        Some(name) => match def.query(name) {
            Some(q) => q.to_query(),
            None => {
                eprintln!("ERROR: No query preset named '{}'", name);
                process::exit(1);
            }
        },
        None => Query::new("command-line"),
    };

    if preset.is_none() || !observations.is_empty() {
        let mut observed: Vec<String> = query.observed_names().to_vec();
        for node in network.nodes().filter(|n| n.is_observed()) {
            if !observed.iter().any(|o| o == node.name()) {
                observed.push(node.name().to_string());
            }
        }
        query.set_observed(observed);
    }

    if !targets.is_empty() {
        query.set_queried(targets);
    } else if query.queried_names().is_empty() {
        let hidden: Vec<String> = network
            .nodes()
            .filter(|n| !n.is_observed())
            .map(|n| n.name().to_string())
            .collect();
        query.set_queried(hidden);
    }

    // 4. Solve
    let outcome = match iterations {
        Some(iterations) => {
            let mut config = SamplerConfig::default().with_iterations(iterations);
            config.seed = seed;
            query.approx(&network, &config)
        }
        None => query.solve(&network),
    };
    if let Err(e) = outcome {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    }

    let method = if query.is_approximate() { "Gibbs sampling" } else { "exact" };
    println!("=== {} ({}) ===", query.name(), method);
    if !query.observed_names().is_empty() {
        println!("Evidence: {}", query.observed_names().join(", "));
    }
    println!();
    for distribution in query.results() {
        println!("{}", distribution);
    }
}

fn parse_number<T: std::str::FromStr>(text: &str, flag: &str) -> T {
    match text.parse() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("ERROR: {} expects a number, got '{}'", flag, text);
            process::exit(1);
        }
    }
}
