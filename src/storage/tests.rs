use std::error::Error;

use chrono::{DateTime, Utc};
use rstest::rstest;
use serde::Deserialize;

use super::*;
use crate::core::Runtime;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    volume: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Event {
    name: String,
    #[serde(with = "iso_millis")]
    at: DateTime<Utc>,
}

fn date(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[rstest]
#[case("2022-09-01T00:00:00.000Z", true)]
#[case("2022-09-01T12:34:56.789Z", true)]
#[case("2022-09-01T00:00:00Z", false)]
#[case("2022-09-01T00:00:00.000+09:00", false)]
#[case("2022-09-01", false)]
#[case("x2022-09-01T00:00:00.000Z", false)]
fn timestamp_pattern(#[case] s: &str, #[case] expected: bool) {
    assert_eq!(is_timestamp(s), expected);
}

#[test]
fn encode_forms() {
    assert_eq!(encode("hello").unwrap(), "hello");
    assert_eq!(encode(&42).unwrap(), "42");
    assert_eq!(encode(&vec![1, 2, 3]).unwrap(), "[1,2,3]");
    assert_eq!(encode(&None::<i32>).unwrap(), "null");
    assert_eq!(
        encode(&Settings {
            theme: "dark".into(),
            volume: 3
        })
        .unwrap(),
        r#"{"theme":"dark","volume":3}"#
    );
    assert_eq!(
        encode("2022-09-01T00:00:00.000Z").unwrap(),
        r#""2022-09-01T00:00:00.000Z""#
    );
}

#[test]
fn decode_forms() {
    assert_eq!(decode::<String>("hello").unwrap(), "hello");
    assert_eq!(decode::<String>("123").unwrap(), "123");
    assert_eq!(decode::<String>(r#""quoted""#).unwrap(), "quoted");
    assert_eq!(decode::<i32>("42").unwrap(), 42);
    assert_eq!(decode::<Option<i32>>("null").unwrap(), None);
    assert!(decode::<Settings>("{not json").is_err());
}

#[test]
fn dates_revive() {
    let at = date("2022-09-01T10:00:00.250Z");
    assert_eq!(
        decode::<DateTime<Utc>>(&encode(&at).unwrap()).unwrap(),
        at
    );

    let event = Event {
        name: "launch".into(),
        at,
    };
    let raw = encode(&event).unwrap();
    assert_eq!(
        raw,
        r#"{"name":"launch","at":"2022-09-01T10:00:00.250Z"}"#
    );
    assert_eq!(decode::<Event>(&raw).unwrap(), event);
}

#[test]
fn initial_value_when_nothing_stored() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let s = PersistedState::new(store.clone(), "name", Some(String::from("Olivia"))).unwrap();
    assert_eq!(s.get(&mut rt.sc()).as_deref(), Some("Olivia"));
    assert_eq!(store.get("name").as_deref(), Some("Olivia"));
    assert_eq!(s.key(), "name");
}

#[test]
fn no_initial_value() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let s = PersistedState::<i32, _>::new(store.clone(), "n", None).unwrap();
    assert_eq!(s.get(&mut rt.sc()), None);
    assert!(store.is_empty());
}

#[test]
fn stored_value_wins_over_initial() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    store.set("settings", r#"{"theme":"light","volume":7}"#);
    let s = PersistedState::<Settings, _>::new_with(store.clone(), "settings", || {
        panic!("initial should not be called")
    })
    .unwrap();
    assert_eq!(
        s.get(&mut rt.sc()),
        Some(Settings {
            theme: "light".into(),
            volume: 7
        })
    );
}

#[test]
fn set_writes_through() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let s = PersistedState::new(store.clone(), "list", Some(vec![1, 2])).unwrap();

    s.set(Some(vec![3]), rt.ac()).unwrap();
    assert_eq!(store.get("list").as_deref(), Some("[3]"));

    s.update(|prev| prev.map(|v| [v.as_slice(), &[4]].concat()), rt.ac())
        .unwrap();
    assert_eq!(s.get(&mut rt.sc()), Some(vec![3, 4]));
    assert_eq!(store.get("list").as_deref(), Some("[3,4]"));
}

#[test]
fn none_removes_key() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let s = PersistedState::new(store.clone(), "k", Some(1)).unwrap();
    assert_eq!(store.len(), 1);
    s.set(None, rt.ac()).unwrap();
    assert!(store.get("k").is_none());
    assert_eq!(s.get(&mut rt.sc()), None);
}

#[test]
fn inner_null_is_stored() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let s = PersistedState::<Option<i32>, _>::new(store.clone(), "k", Some(Some(1))).unwrap();
    s.set(Some(None), rt.ac()).unwrap();
    assert_eq!(store.get("k").as_deref(), Some("null"));
}

#[test]
fn strings_are_stored_unquoted() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let s = PersistedState::new(store.clone(), "greeting", Some(String::from("hi"))).unwrap();
    s.set(Some(String::from("hello there")), rt.ac()).unwrap();
    assert_eq!(store.get("greeting").as_deref(), Some("hello there"));

    drop(s);
    let revived = PersistedState::<String, _>::new(store, "greeting", None).unwrap();
    assert_eq!(revived.get(&mut rt.sc()).as_deref(), Some("hello there"));
}

#[test]
fn revives_across_sessions() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let at = date("2022-09-01T00:00:00.000Z");
    {
        let s = PersistedState::new(store.clone(), "last", None::<Event>).unwrap();
        s.set(
            Some(Event {
                name: "visit".into(),
                at,
            }),
            rt.ac(),
        )
        .unwrap();
    }
    let s = PersistedState::<Event, _>::new(store.clone(), "last", None).unwrap();
    assert_eq!(s.get(&mut rt.sc()).map(|e| e.at), Some(at));

    let d = PersistedState::new(store.clone(), "date", Some(at)).unwrap();
    assert_eq!(store.get("date").as_deref(), Some("2022-09-01T00:00:00Z"));
    drop(d);
    let d = PersistedState::<DateTime<Utc>, _>::new(store, "date", None).unwrap();
    assert_eq!(d.get(&mut rt.sc()), Some(at));
}

#[test]
fn malformed_stored_value() {
    let store = MemoryStore::new();
    store.set("settings", "{broken");
    let e = PersistedState::<Settings, _>::new(store, "settings", None).unwrap_err();
    assert!(matches!(e, StorageError::Decode { .. }));
    assert!(e.to_string().starts_with("failed to decode stored value for `settings`"));
    assert!(e.source().is_some());
}

#[test]
fn unencodable_value_leaves_state_unchanged() {
    let mut rt = Runtime::new();
    let store = MemoryStore::new();
    let initial = Some(BTreeMap::<Vec<u8>, u8>::new());
    let s = PersistedState::new(store.clone(), "map", initial).unwrap();
    let mut bad = BTreeMap::new();
    bad.insert(vec![1u8], 1u8);
    let e = s.set(Some(bad), rt.ac()).unwrap_err();
    assert!(matches!(e, StorageError::Encode { .. }));
    assert_eq!(s.get(&mut rt.sc()), Some(BTreeMap::new()));
    assert_eq!(store.get("map").as_deref(), Some("{}"));
}

#[test]
fn effect_observes_writes() {
    use assert_call::{call, CallRecorder};

    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = PersistedState::new(MemoryStore::new(), "n", Some(1)).unwrap();
    let s0 = s.clone();
    let _e = crate::effect(move |sc| call!("{:?}", s0.get(sc)));
    rt.update();
    cr.verify("Some(1)");
    s.set(Some(2), rt.ac()).unwrap();
    rt.update();
    cr.verify("Some(2)");
}

#[test]
fn shared_store_through_rc() {
    let mut rt = Runtime::new();
    let store = Rc::new(MemoryStore::new());
    let s = PersistedState::new(store.clone(), "k", Some(5)).unwrap();
    assert_eq!(store.get("k").as_deref(), Some("5"));
    assert_eq!(s.store().get("k").as_deref(), Some("5"));
    assert_eq!(s.get(&mut rt.sc()), Some(5));
}
