/// Network Linter — validates structure and CPT normalization of network files.
///
/// Usage: bn_lint <network.ron | dir> [--tolerance <eps>]

use bayes_engine::core::error::BayesError;
use bayes_engine::core::network::CPT_TOLERANCE;
use bayes_engine::core::query::Query;
use bayes_engine::schema::network_def::NetworkDef;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: bn_lint <network.ron | dir> [--tolerance <eps>]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut tolerance = CPT_TOLERANCE;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--tolerance" && i + 1 < args.len() {
            i += 1;
            tolerance = match args[i].parse() {
                Ok(t) => t,
                Err(_) => {
                    eprintln!("ERROR: --tolerance expects a number, got '{}'", args[i]);
                    process::exit(1);
                }
            };
        }
        i += 1;
    }

    let mut files = Vec::new();
    if target.is_file() {
        files.push(target.to_path_buf());
    } else if target.is_dir() {
        collect_ron_files(target, &mut files);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for path in &files {
        match NetworkDef::load_from_ron(path) {
            Ok(def) => {
                println!("  Loaded: {}", path.display());
                let (e, w) = lint_network(&def, tolerance);
                let label = path.display().to_string();
                errors.extend(e.into_iter().map(|m| format!("{}: {}", label, m)));
                warnings.extend(w.into_iter().map(|m| format!("{}: {}", label, m)));
            }
            Err(e) => errors.push(format!("{}: failed to load: {}", path.display(), e)),
        }
    }

    println!("\n=== Network Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_ron_files(dir: &Path, files: &mut Vec<std::path::PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_ron_files(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                files.push(path);
            }
        }
    }
}

fn lint_network(def: &NetworkDef, tolerance: f64) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // 1. Names and references
    let mut seen = FxHashSet::default();
    for node in &def.nodes {
        if !seen.insert(node.name.as_str()) {
            errors.push(format!("node '{}' is defined twice", node.name));
        }
        if node.states.is_empty() {
            errors.push(format!("node '{}' has no states", node.name));
        }
        if node.cpt.is_none() {
            warnings.push(format!(
                "node '{}' has no CPT; it defaults to always '{}'",
                node.name,
                node.states.first().map(String::as_str).unwrap_or("?")
            ));
        }
        if node.parents.len() > 4 {
            warnings.push(format!(
                "node '{}' has {} parents; its CPT grows exponentially",
                node.name,
                node.parents.len()
            ));
        }
    }
    for node in &def.nodes {
        for parent in &node.parents {
            if !seen.contains(parent.as_str()) {
                errors.push(format!("node '{}' names unknown parent '{}'", node.name, parent));
            }
        }
    }
    if !errors.is_empty() {
        return (errors, warnings);
    }

    // 2. CPT shapes and normalization, checked before the builder would
    //    force-normalize small drift
    let states: FxHashMap<&str, usize> = def
        .nodes
        .iter()
        .map(|n| (n.name.as_str(), n.states.len()))
        .collect();
    for node in &def.nodes {
        let Some(cpt) = &node.cpt else { continue };
        let expected: usize = node
            .parents
            .iter()
            .map(|p| states.get(p.as_str()).copied().unwrap_or(1))
            .product::<usize>()
            * node.states.len();
        if cpt.len() != expected {
            errors.push(format!(
                "node '{}' CPT has {} values, expected {}",
                node.name,
                cpt.len(),
                expected
            ));
            continue;
        }
        let columns = expected / node.states.len().max(1);
        for column in 0..columns {
            let sum: f64 = (0..node.states.len()).map(|s| cpt[s * columns + column]).sum();
            if (sum - 1.0).abs() > tolerance {
                errors.push(format!(
                    "node '{}' CPT column {} sums to {:.6}",
                    node.name, column, sum
                ));
            }
        }
        if cpt.iter().any(|v| *v < 0.0) {
            errors.push(format!("node '{}' CPT has negative entries", node.name));
        }
    }

    // 3. Build, then run every preset once
    let network = match def.build() {
        Ok(network) => network,
        Err(e) => {
            errors.push(format!("failed to build: {}", e));
            return (errors, warnings);
        }
    };
    for preset in &def.queries {
        let mut query: Query = preset.to_query();
        if preset.queried.is_empty() {
            warnings.push(format!("query '{}' queries nothing", preset.name));
        }
        match query.solve(&network) {
            Ok(()) => {}
            Err(BayesError::MissingEvidence(node)) => warnings.push(format!(
                "query '{}' needs evidence for '{}' before it can run",
                preset.name, node
            )),
            Err(e) => errors.push(format!("query '{}' fails: {}", preset.name, e)),
        }
    }

    (errors, warnings)
}
