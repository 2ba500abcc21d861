//! Property tests for payload handling and event classification.

use kv_watch::{
    Codec, Event, EventType, FilterFn, JsonCodec, MemoryClient, ObjectVersioner, Versioned,
    WatchConfig, WatchHelper,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Pod {
    name: String,
    ready: bool,
    labels: BTreeMap<String, String>,
    #[serde(skip)]
    version: u64,
}

impl Versioned for Pod {
    fn resource_version(&self) -> u64 {
        self.version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.version = version;
    }
}

fn arb_pod() -> impl Strategy<Value = Pod> {
    (
        "[a-z][a-z0-9-]{0,12}",
        any::<bool>(),
        prop::collection::btree_map("[a-z]{1,6}", "[ -~]{0,10}", 0..4),
    )
        .prop_map(|(name, ready, labels)| Pod {
            name,
            ready,
            labels,
            version: 0,
        })
}

/// A write (`Some(ready)`) or delete (`None`) of one of a few keys.
fn arb_ops() -> impl Strategy<Value = Vec<(u8, Option<bool>)>> {
    prop::collection::vec((0u8..4, prop::option::weighted(0.8, any::<bool>())), 1..24)
}

fn encoded(name: &str, ready: bool) -> String {
    serde_json::to_string(&Pod {
        name: name.to_string(),
        ready,
        labels: BTreeMap::new(),
        version: 0,
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_codec_round_trip(pod in arb_pod(), version in 1u64..u64::MAX) {
        let codec = JsonCodec::<Pod>::new();
        let mut decoded = codec.decode(&codec.encode(&pod).unwrap()).unwrap();
        prop_assert_eq!(&decoded, &pod);

        decoded.set_resource_version(version);
        let again = codec.decode(&codec.encode(&decoded).unwrap()).unwrap();
        prop_assert_eq!(again, pod);
    }

    /// Replaying the filtered event stream reproduces exactly the set of
    /// objects that pass the filter, and every object carries a store index.
    #[test]
    fn prop_filtered_stream_tracks_visible_set(ops in arb_ops()) {
        let store = Arc::new(MemoryClient::new());
        let mut expected = BTreeMap::new();
        for (key, op) in &ops {
            let path = format!("/pods/{key}");
            match op {
                Some(ready) => {
                    store.set(&path, encoded(&key.to_string(), *ready)).unwrap();
                    expected.insert(key.to_string(), *ready);
                }
                None => {
                    if store.delete(&path).is_ok() {
                        expected.remove(&key.to_string());
                    }
                }
            }
        }
        store.set("/pods/end", encoded("end", true)).unwrap();

        let ready: FilterFn<Pod> = Arc::new(|pod: &Pod| pod.ready);
        let helper = WatchHelper::new(store.clone(), Arc::new(JsonCodec::<Pod>::new()))
            .with_versioner(Arc::new(ObjectVersioner))
            .with_config(WatchConfig::default().with_grace_window(Duration::from_millis(5)));
        let stream = helper.watch_list("/pods", Some(1), ready).unwrap();

        let mut visible = BTreeSet::new();
        let head = store.index();
        loop {
            let Event { kind, object } = stream.next_timeout(Duration::from_secs(2)).unwrap();
            prop_assert!(object.version > 0 && object.version <= head);

            match kind {
                EventType::Added => prop_assert!(visible.insert(object.name.clone())),
                EventType::Modified => prop_assert!(visible.contains(&object.name)),
                EventType::Deleted => prop_assert!(visible.remove(&object.name)),
            }
            if object.name == "end" {
                break;
            }
        }
        stream.stop();

        let mut want: BTreeSet<_> = expected
            .into_iter()
            .filter(|(_, ready)| *ready)
            .map(|(name, _)| name)
            .collect();
        want.insert("end".to_string());
        prop_assert_eq!(visible, want);
    }
}
