/// Burglar Alarm example — the classic five-node network loaded from RON.
///
/// Both neighbours call → how worried should we be? Then the network is
/// saved to the binary format, reloaded and asked again.
///
/// Run with: cargo run --example burglar_alarm

use bayes_engine::core::persist::{read_network, write_network};
use bayes_engine::core::sampler::SamplerConfig;
use bayes_engine::schema::network_def::NetworkDef;

fn main() {
    // --- Load the network and its query presets ---
    let def = NetworkDef::load_from_ron(std::path::Path::new("tests/fixtures/alarm.ron"))
        .expect("Failed to load alarm network");
    let mut net = def.build().expect("Failed to build alarm network");
    println!("Loaded '{}' with {} nodes\n", def.name, net.len());

    // --- John and Mary both call ---
    net.observe("JohnCalls", "T").expect("Observe JohnCalls");
    net.observe("MaryCalls", "T").expect("Observe MaryCalls");

    let mut query = def
        .query("burglary")
        .expect("Missing 'burglary' preset")
        .to_query();
    query.solve(&net).expect("Exact query failed");
    println!("=== {} (exact) ===\n", query.name());
    for distribution in query.results() {
        println!("{}", distribution);
    }
    if let Some(joint) = query.joint() {
        println!("Joint over {} variables: {:?}\n", joint.vars().len(), joint.values());
    }

    // --- Gibbs sampling struggles with rare causes; show it anyway ---
    let config = SamplerConfig::default()
        .with_iterations(200_000)
        .with_burn_in(2_000)
        .with_seed(7);
    query.approx(&net, &config).expect("Sampling failed");
    println!("=== {} (Gibbs sampling) ===\n", query.name());
    for distribution in query.results() {
        println!("{}", distribution);
    }

    // --- Save, reload, ask again ---
    let mut bytes = Vec::new();
    write_network(&mut bytes, &net).expect("Failed to write network");
    println!("Binary network: {} bytes", bytes.len());

    let reloaded = read_network(&mut bytes.as_slice()).expect("Failed to read network");
    let mut again = def
        .query("burglary")
        .expect("Missing 'burglary' preset")
        .to_query();
    again.solve(&reloaded).expect("Query on reloaded network failed");
    println!("\n=== {} (reloaded) ===\n", again.name());
    for distribution in again.results() {
        println!("{}", distribution);
    }
}
