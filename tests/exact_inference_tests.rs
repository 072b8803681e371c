/// Exact inference integration tests — bucket elimination checked against
/// Bayes' rule and brute-force enumeration.

use bayes_engine::core::error::BayesError;
use bayes_engine::core::network::Network;
use bayes_engine::core::node::NodeId;
use bayes_engine::core::ordering::Ordering;
use bayes_engine::schema::network_def::NetworkDef;

fn load(fixture: &str) -> (NetworkDef, Network) {
    let path = std::path::Path::new("tests/fixtures").join(fixture);
    let def = NetworkDef::load_from_ron(&path).unwrap();
    let net = def.build().unwrap();
    (def, net)
}

/// P(targets = states | evidence) by summing the full joint.
fn enumerate(net: &Network, targets: &[(NodeId, usize)], evidence: &[(NodeId, usize)]) -> f64 {
    let ids: Vec<NodeId> = net.topological_order().to_vec();
    let sizes: Vec<usize> = ids.iter().map(|id| net.node(*id).unwrap().num_states()).collect();
    let mut states = vec![0usize; ids.len()];
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    loop {
        let state_of = |id: NodeId| states[ids.iter().position(|v| *v == id).unwrap()];
        let consistent = evidence.iter().all(|(id, s)| state_of(*id) == *s);
        if consistent {
            let mut p = 1.0;
            for id in &ids {
                let cpt = net.node(*id).unwrap().cpt();
                let index: Vec<usize> = cpt.vars().iter().map(|v| state_of(*v)).collect();
                p *= cpt.value(&index).unwrap();
            }
            denominator += p;
            if targets.iter().all(|(id, s)| state_of(*id) == *s) {
                numerator += p;
            }
        }

        let mut axis = ids.len();
        loop {
            if axis == 0 {
                return numerator / denominator;
            }
            axis -= 1;
            states[axis] += 1;
            if states[axis] < sizes[axis] {
                break;
            }
            states[axis] = 0;
        }
    }
}

#[test]
fn umbrella_given_rain() {
    let (def, mut net) = load("weather.ron");
    net.observe("Weather", "Rainy").unwrap();
    let mut query = def.query("umbrella_given_weather").unwrap().to_query();
    query.solve(&net).unwrap();
    let umbrella = query.distribution("Umbrella").unwrap();
    assert!((umbrella.value("Yes").unwrap() - 0.8).abs() < 1e-12);
    assert!((umbrella.value("No").unwrap() - 0.2).abs() < 1e-12);
}

#[test]
fn rain_given_umbrella() {
    let (def, mut net) = load("weather.ron");
    net.observe("Umbrella", "Yes").unwrap();
    let mut query = def.query("weather_given_umbrella").unwrap().to_query();
    query.solve(&net).unwrap();
    let weather = query.distribution("Weather").unwrap();
    assert!((weather.value("Sunny").unwrap() - 0.2258).abs() < 1e-4);
    assert!((weather.value("Rainy").unwrap() - 0.7742).abs() < 1e-4);
}

#[test]
fn burglary_given_both_calls() {
    let (def, mut net) = load("alarm.ron");
    net.observe("JohnCalls", "T").unwrap();
    net.observe("MaryCalls", "T").unwrap();
    let mut query = def.query("burglary").unwrap().to_query();
    query.solve(&net).unwrap();

    let burglary = query.distribution("Burglary").unwrap().value("T").unwrap();
    assert!((burglary - 0.284172).abs() < 1e-5, "got {burglary}");
    let earthquake = query.distribution("Earthquake").unwrap().value("T").unwrap();
    assert!((earthquake - 0.176067).abs() < 1e-5, "got {earthquake}");
}

#[test]
fn every_marginal_matches_enumeration() {
    let (_, mut net) = load("alarm.ron");
    let names = ["Burglary", "Earthquake", "Alarm", "JohnCalls", "MaryCalls"];
    let evidence_sets: [&[(&str, &str)]; 4] = [
        &[],
        &[("JohnCalls", "T")],
        &[("MaryCalls", "F"), ("Earthquake", "T")],
        &[("Alarm", "F"), ("Burglary", "T")],
    ];

    for evidence in evidence_sets {
        net.clear_evidence();
        let mut observed = Vec::new();
        let mut pinned = Vec::new();
        for (node, state) in evidence {
            net.observe(node, state).unwrap();
            let id = net.id(node).unwrap();
            observed.push(node.to_string());
            pinned.push((id, net.node(id).unwrap().state_index(state).unwrap()));
        }

        let hidden: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !evidence.iter().any(|(e, _)| e == n))
            .collect();
        let mut query = bayes_engine::core::query::Query::new("all")
            .queried(hidden.iter().copied())
            .observed(observed);
        query.solve(&net).unwrap();

        for name in &hidden {
            let id = net.id(name).unwrap();
            let exact = enumerate(&net, &[(id, 0)], &pinned);
            let got = query.distribution(name).unwrap().value("T").unwrap();
            assert!(
                (got - exact).abs() < 1e-9,
                "{name} with {evidence:?}: got {got}, want {exact}"
            );
        }
    }
}

#[test]
fn joint_over_two_queries_matches_enumeration() {
    let (def, mut net) = load("alarm.ron");
    net.observe("JohnCalls", "T").unwrap();
    net.observe("MaryCalls", "F").unwrap();
    let mut query = def.query("burglary").unwrap().to_query();
    query.solve(&net).unwrap();

    let b = net.id("Burglary").unwrap();
    let e = net.id("Earthquake").unwrap();
    let j = net.id("JohnCalls").unwrap();
    let m = net.id("MaryCalls").unwrap();
    let joint = query.joint().unwrap();
    assert_eq!(joint.vars().len(), 2);
    assert!((joint.total() - 1.0).abs() < 1e-12);

    for sb in 0..2 {
        for se in 0..2 {
            let index: Vec<usize> = joint
                .vars()
                .iter()
                .map(|v| if *v == b { sb } else { se })
                .collect();
            let exact = enumerate(&net, &[(b, sb), (e, se)], &[(j, 0), (m, 1)]);
            assert!((joint.value(&index).unwrap() - exact).abs() < 1e-9);
        }
    }
}

#[test]
fn evidence_value_changes_reuse_the_elimination() {
    let (def, mut net) = load("alarm.ron");
    let mut query = def.query("burglary").unwrap().to_query();

    for (john, mary) in [("T", "T"), ("T", "F"), ("F", "T"), ("F", "F")] {
        net.observe("JohnCalls", john).unwrap();
        net.observe("MaryCalls", mary).unwrap();
        query.solve(&net).unwrap();
    }
    assert_eq!(query.eliminations(), 1);
    assert!(query.is_cached());

    let burglary = query.distribution("Burglary").unwrap().value("T").unwrap();
    let b = net.id("Burglary").unwrap();
    let j = net.id("JohnCalls").unwrap();
    let m = net.id("MaryCalls").unwrap();
    assert!((burglary - enumerate(&net, &[(b, 0)], &[(j, 1), (m, 1)])).abs() < 1e-9);
}

#[test]
fn structural_changes_trigger_exactly_one_re_elimination() {
    let (def, mut net) = load("alarm.ron");
    net.observe("JohnCalls", "T").unwrap();
    net.observe("MaryCalls", "T").unwrap();
    let mut query = def.query("burglary").unwrap().to_query();
    query.solve(&net).unwrap();

    net.add_parent("MaryCalls", "Earthquake").unwrap();
    query.solve(&net).unwrap();
    query.solve(&net).unwrap();
    assert_eq!(query.eliminations(), 2);

    net.add_state("Alarm", "Broken").unwrap();
    query.solve(&net).unwrap();
    assert_eq!(query.eliminations(), 3);

    query.set_observed(["JohnCalls"]);
    query.solve(&net).unwrap();
    query.solve(&net).unwrap();
    assert_eq!(query.eliminations(), 4);
}

#[test]
fn ordering_contract_holds_for_every_query_set() {
    let (_, mut net) = load("alarm.ron");
    net.observe("MaryCalls", "T").unwrap();
    let ctx = net.assignment();
    let ids: Vec<NodeId> = net.topological_order().to_vec();

    for mask in 0u32..(1 << ids.len()) {
        let queries: Vec<NodeId> = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, id)| *id)
            .collect();
        let order = Ordering::compute(&net, &ctx, &queries).unwrap();
        assert_eq!(order.len(), ids.len());

        let pos = |id: &NodeId| order.as_slice().iter().position(|v| v == id).unwrap();
        for a in order.as_slice() {
            for b in order.as_slice() {
                if ctx.is_observed(*a) && !ctx.is_observed(*b) {
                    assert!(pos(a) < pos(b));
                }
                let a_query = queries.contains(a) && !ctx.is_observed(*a);
                let b_query = queries.contains(b) && !ctx.is_observed(*b);
                if !a_query && b_query {
                    assert!(pos(a) < pos(b));
                }
            }
        }
    }
}

#[test]
fn removing_a_parent_keeps_the_chosen_slice() {
    let (_, mut net) = load("alarm.ron");
    net.remove_parent("Alarm", "Earthquake", "F").unwrap();
    let alarm = net.node_by_name("Alarm").unwrap();
    assert_eq!(alarm.cpt().values(), &[0.94, 0.001, 0.06, 0.999]);

    let mut query = bayes_engine::core::query::Query::new("a").queried(["Alarm"]);
    query.solve(&net).unwrap();
    let p = query.distribution("Alarm").unwrap().value("T").unwrap();
    assert!((p - (0.001 * 0.94 + 0.999 * 0.001)).abs() < 1e-12);
}

#[test]
fn removing_a_node_rewires_children() {
    let (_, mut net) = load("alarm.ron");
    net.observe("Alarm", "T").unwrap();
    net.remove_node("Alarm").unwrap();
    assert_eq!(net.len(), 4);
    let john = net.node_by_name("JohnCalls").unwrap();
    assert!(john.is_root());
    assert_eq!(john.cpt().values(), &[0.9, 0.1]);
    assert!(matches!(
        net.node_by_name("Alarm"),
        Err(BayesError::UnknownVariable(_))
    ));
}

#[test]
fn strict_tolerance_passes_on_clean_networks() {
    let (_, mut net) = load("weather.ron");
    net.observe("Umbrella", "No").unwrap();
    let mut query = bayes_engine::core::query::Query::new("strict")
        .queried(["Weather"])
        .observed(["Umbrella"])
        .with_options(bayes_engine::core::query::QueryOptions {
            strict_tolerance: Some(1e-9),
        });
    query.solve(&net).unwrap();
    let sunny = query.distribution("Weather").unwrap().value("Sunny").unwrap();
    assert!((sunny - 0.63 / 0.69).abs() < 1e-12);
}

#[test]
fn strict_tolerance_rejects_an_unfilled_new_state() {
    let (_, mut net) = load("alarm.ron");
    net.add_state("Alarm", "Broken").unwrap();
    net.observe("JohnCalls", "T").unwrap();
    let mut query = bayes_engine::core::query::Query::new("strict")
        .queried(["Burglary"])
        .observed(["JohnCalls"])
        .with_options(bayes_engine::core::query::QueryOptions {
            strict_tolerance: Some(1e-6),
        });
    assert!(matches!(
        query.solve(&net),
        Err(BayesError::Denormalized { .. })
    ));
}
