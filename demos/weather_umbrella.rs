/// Weather/Umbrella example — builds a two-node network in code and reasons
/// in both directions.
///
/// Forecast → who carries an umbrella → what the umbrella says about the sky.
///
/// Run with: cargo run --example weather_umbrella

use bayes_engine::core::network::Network;
use bayes_engine::core::query::Query;
use bayes_engine::core::sampler::SamplerConfig;

fn main() {
    // --- Build the network ---
    let mut net = Network::new();
    net.add_node("Weather", ["Sunny", "Rainy"])
        .expect("Failed to add Weather");
    net.add_node("Umbrella", ["Yes", "No"])
        .expect("Failed to add Umbrella");
    net.add_parent("Umbrella", "Weather")
        .expect("Failed to link Umbrella to Weather");
    net.set_prior("Weather", vec![0.7, 0.3])
        .expect("Weather prior");
    // Rows are Umbrella states, columns are Weather states
    net.set_prior("Umbrella", vec![0.1, 0.8, 0.9, 0.2])
        .expect("Umbrella CPT");

    // --- Beliefs with no evidence ---
    net.local_inference().expect("Local inference failed");
    println!("=== Prior beliefs ===\n");
    for node in net.nodes() {
        println!("{}", node.belief());
    }
    net.record_beliefs("prior");

    // --- Causal direction: it is raining ---
    net.observe("Weather", "Rainy").expect("Observe Weather");
    let mut forward = Query::new("umbrella_given_weather")
        .queried(["Umbrella"])
        .observed(["Weather"]);
    forward.solve(&net).expect("Forward query failed");
    println!("=== P(Umbrella | Weather = Rainy) ===\n");
    for distribution in forward.results() {
        println!("{}", distribution);
    }

    // --- Diagnostic direction: someone carries an umbrella ---
    net.clear_evidence();
    net.observe("Umbrella", "Yes").expect("Observe Umbrella");
    let mut backward = Query::new("weather_given_umbrella")
        .queried(["Weather"])
        .observed(["Umbrella"]);
    backward.solve(&net).expect("Backward query failed");
    println!("=== P(Weather | Umbrella = Yes), exact ===\n");
    for distribution in backward.results() {
        println!("{}", distribution);
    }

    // --- Same question by Gibbs sampling ---
    let config = SamplerConfig::default()
        .with_iterations(50_000)
        .with_burn_in(500)
        .with_seed(2026);
    backward.approx(&net, &config).expect("Sampling failed");
    println!("=== P(Weather | Umbrella = Yes), Gibbs ===\n");
    for distribution in backward.results() {
        println!("{}", distribution);
    }

    // --- Evidence changes reuse the cached elimination ---
    net.observe("Umbrella", "No").expect("Observe Umbrella");
    backward.solve(&net).expect("Backward query failed");
    println!("=== P(Weather | Umbrella = No) ===\n");
    for distribution in backward.results() {
        println!("{}", distribution);
    }
    println!("Eliminations performed: {}", backward.eliminations());

    net.recall_beliefs("prior").expect("Recall prior beliefs");
}
