/// Gibbs sampling integration tests — convergence toward the exact posteriors.

use bayes_engine::core::query::Query;
use bayes_engine::core::sampler::{GibbsSampler, SamplerConfig};
use bayes_engine::schema::network_def::NetworkDef;

fn load(fixture: &str) -> NetworkDef {
    let path = std::path::Path::new("tests/fixtures").join(fixture);
    NetworkDef::load_from_ron(&path).unwrap()
}

#[test]
fn weather_given_umbrella_converges() {
    let def = load("weather.ron");
    let mut net = def.build().unwrap();
    net.observe("Umbrella", "Yes").unwrap();

    let mut query = def.query("weather_given_umbrella").unwrap().to_query();
    let config = SamplerConfig::default().with_iterations(100_000).with_seed(42);
    query.approx(&net, &config).unwrap();

    let weather = query.distribution("Weather").unwrap();
    assert!((weather.value("Sunny").unwrap() - 0.07 / 0.31).abs() < 0.02);
    assert!((weather.value("Rainy").unwrap() - 0.24 / 0.31).abs() < 0.02);
    assert!((weather.values().iter().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn approx_agrees_with_solve_on_the_alarm_network() {
    let def = load("alarm.ron");
    let mut net = def.build().unwrap();
    net.observe("JohnCalls", "T").unwrap();

    let mut exact = Query::new("exact")
        .queried(["Alarm", "MaryCalls"])
        .observed(["JohnCalls"]);
    exact.solve(&net).unwrap();

    let mut sampled = Query::new("sampled")
        .queried(["Alarm", "MaryCalls"])
        .observed(["JohnCalls"]);
    let config = SamplerConfig::default()
        .with_iterations(100_000)
        .with_burn_in(1_000)
        .with_seed(7);
    sampled.approx(&net, &config).unwrap();

    for name in ["Alarm", "MaryCalls"] {
        let want = exact.distribution(name).unwrap().value("T").unwrap();
        let got = sampled.distribution(name).unwrap().value("T").unwrap();
        assert!((got - want).abs() < 0.02, "{name}: got {got}, want {want}");
    }
}

#[test]
fn approximate_joint_is_the_product_of_marginals() {
    let def = load("alarm.ron");
    let net = def.build().unwrap();
    let mut query = Query::new("pair").queried(["JohnCalls", "MaryCalls"]);
    let config = SamplerConfig::default().with_iterations(2_000).with_seed(5);
    query.approx(&net, &config).unwrap();

    let joint = query.joint().unwrap();
    assert_eq!(joint.values().len(), 4);
    let john = query.distribution("JohnCalls").unwrap().values().to_vec();
    let mary = query.distribution("MaryCalls").unwrap().values().to_vec();
    assert!((joint.value(&[0, 0]).unwrap() - john[0] * mary[0]).abs() < 1e-12);
    assert!((joint.value(&[1, 0]).unwrap() - john[1] * mary[0]).abs() < 1e-12);
}

#[test]
fn observed_query_variables_stay_one_hot() {
    let def = load("weather.ron");
    let mut net = def.build().unwrap();
    net.observe("Weather", "Rainy").unwrap();
    let mut query = Query::new("both")
        .queried(["Weather", "Umbrella"])
        .observed(["Weather"]);
    let config = SamplerConfig::default().with_iterations(50_000).with_seed(1);
    query.approx(&net, &config).unwrap();

    assert_eq!(query.distribution("Weather").unwrap().values(), &[0.0, 1.0]);
    let yes = query.distribution("Umbrella").unwrap().value("Yes").unwrap();
    assert!((yes - 0.8).abs() < 0.02);
}

#[test]
fn sampler_reads_but_never_mutates_the_network() {
    let def = load("alarm.ron");
    let net = def.build().unwrap();
    let before = net.revision();
    let evidence = net.assignment();

    let mut sampler = GibbsSampler::new(SamplerConfig::default().with_iterations(500).with_seed(3));
    sampler.run(&net, &evidence).unwrap();
    assert_eq!(net.revision(), before);
    assert_eq!(net.evidence_count(), 0);
    assert_eq!(sampler.sweeps(), 500);
}
