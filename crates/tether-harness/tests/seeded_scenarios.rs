#![forbid(unsafe_code)]

//! Seeded end-to-end scenarios.
//!
//! A reactive graph (pool -> share -> map/count, dict -> keys) is driven by a
//! seeded operation stream. Set `TETHER_TEST_SEED` to replay a failing run;
//! every step is emitted as a JSONL line on stderr.

use std::collections::BTreeMap;

use serde_json::json;
use tether::prelude::*;
use tether_harness::{CountingSource, Spy, TestJsonlLogger, init_tracing};

const STEPS: usize = 200;

#[test]
fn shared_pool_graph_stays_consistent() {
    init_tracing();
    let logger = TestJsonlLogger::new("shared_pool_graph", 0x7e7e_0001);
    let mut rng = logger.fixture().rng();

    let pool = Pool::<u64>::new();
    let source = CountingSource::new(&pool);
    let shared = source.share();
    let doubled = Spy::<u64>::new();
    let counted = Spy::<usize>::new();
    let _d = shared.map(|x: u64| x * 2).subscribe(doubled.observer());
    let _c = shared.count().subscribe(counted.observer());

    let mut held: Vec<(u64, Scope)> = Vec::new();
    for step in 0..STEPS {
        if held.is_empty() || rng.chance(3, 5) {
            let value = rng.below(10);
            held.push((value, pool.add(value)));
            logger.log("add", &[("step", json!(step)), ("value", json!(value))]);
        } else {
            let index = rng.below(held.len() as u64) as usize;
            let (value, scope) = held.remove(index);
            scope.close();
            logger.log("remove", &[("step", json!(step)), ("value", json!(value))]);
        }

        let mut expected: Vec<u64> = held.iter().map(|(v, _)| v * 2).collect();
        let mut live = doubled.live();
        expected.sort_unstable();
        live.sort_unstable();
        assert_eq!(live, expected, "step {step}, seed {}", logger.fixture().seed());
        assert_eq!(counted.live(), vec![held.len()], "step {step}");
    }
    assert_eq!(source.subscribes(), 1);
    logger.log("done", &[("live", json!(held.len()))]);
}

#[test]
fn dict_keys_track_model() {
    let logger = TestJsonlLogger::new("dict_keys", 0x7e7e_0002);
    let mut rng = logger.fixture().rng();

    let dict = Dict::<u64, u64>::new();
    let keys = Spy::<u64>::new();
    let values = Spy::<u64>::new();
    let _k = dict.keys().subscribe(keys.observer());
    let _v = dict.values().subscribe(values.observer());
    let mut model: BTreeMap<u64, u64> = BTreeMap::new();

    for step in 0..STEPS {
        let key = rng.below(6);
        if rng.chance(4, 5) {
            let value = rng.below(3);
            dict.put(key, value);
            model.insert(key, value);
            logger.log("put", &[("key", json!(key)), ("value", json!(value))]);
        } else {
            dict.remove(key);
            model.remove(&key);
            logger.log("remove", &[("key", json!(key))]);
        }

        let mut live_keys = keys.live();
        live_keys.sort_unstable();
        assert_eq!(
            live_keys,
            model.keys().copied().collect::<Vec<_>>(),
            "step {step}, seed {}",
            logger.fixture().seed()
        );
        assert_eq!(values.live().len(), model.len(), "step {step}");
    }
}
