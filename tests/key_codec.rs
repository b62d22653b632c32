//! Canonical key encoding and reconstruction.

use query_tier_cache::cache::{EscapeMode, KeyCodecConfig};
use query_tier_cache::{Error, KeyCodec, PositionalKeyCodec, Query};
use serde_json::{json, Map, Value};

fn structured(pairs: &[(&str, Value)]) -> Query {
    // serde_json::Map and Query::Structured are both sorted, so insertion
    // order never reaches the codec. The order tests pin that it cannot.
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v.clone());
    }
    Query::from_json(Value::Object(map))
}

#[test]
fn test_key_is_independent_of_field_order() {
    let codec = PositionalKeyCodec::new();
    let forward = structured(&[
        ("table", json!("orders")),
        ("status", json!("SHIPPED")),
        ("region", json!("US-EAST")),
        ("min_amount", json!(100)),
    ]);
    let backward = structured(&[
        ("min_amount", json!(100)),
        ("region", json!("US-EAST")),
        ("status", json!("SHIPPED")),
        ("table", json!("orders")),
    ]);

    let a = codec.generate_key(&forward).unwrap();
    let b = codec.generate_key(&backward).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        a.as_str(),
        "orders|min_amount=100;region=US-EAST;status=SHIPPED"
    );
}

#[test]
fn test_default_projection_gives_two_segments() {
    let codec = PositionalKeyCodec::new();
    for projection in [None, Some("*"), Some("ALL")] {
        let mut builder = Query::table("users").filter("id", 123);
        if let Some(p) = projection {
            builder = builder.columns(p);
        }
        let key = codec.generate_key(&builder.build()).unwrap();
        assert_eq!(key.as_str(), "users|id=123");
        assert_eq!(key.as_str().matches('|').count(), 1);
    }
}

#[test]
fn test_explicit_projection_gives_three_segments() {
    let key = PositionalKeyCodec::new()
        .generate_key(&Query::from_json(
            json!({"table": "users", "id": 123, "columns": "id,name"}),
        ))
        .unwrap();
    assert_eq!(key.as_str(), "users|id=123|id,name");
}

#[test]
fn test_round_trip_restores_table_filters_and_projection() {
    let codec = PositionalKeyCodec::new();
    let cases = [
        json!({"table": "users", "id": "123", "columns": "id,name"}),
        json!({"table": "orders", "status": "SHIPPED", "region": "US-EAST", "select": "total"}),
        json!({"table": "audit", "actor": "svc-7"}),
        json!({"table": "empty"}),
    ];

    for case in cases {
        let query = Query::from_json(case.clone());
        let key = codec.generate_key(&query).unwrap();
        let rebuilt = codec.reconstruct_query(key.as_str()).unwrap();

        assert_eq!(rebuilt.table_name(), query.table_name(), "case {case}");
        assert_eq!(rebuilt.filters(), query.filters(), "case {case}");
        let projection = query
            .field("columns")
            .or_else(|| query.field("select"))
            .cloned();
        assert_eq!(rebuilt.field("columns").cloned(), projection, "case {case}");
        assert_eq!(codec.generate_key(&rebuilt).unwrap(), key);
    }
}

#[test]
fn test_zero_filters_round_trip_to_table_only() {
    let codec = PositionalKeyCodec::new();
    let key = codec.generate_key(&Query::table("users").build()).unwrap();
    assert_eq!(key.as_str(), "users|");
    assert_eq!(
        codec.reconstruct_query(key.as_str()).unwrap(),
        Query::from_json(json!({"table": "users"}))
    );
}

#[test]
fn test_opaque_queries_are_not_reversible() {
    let codec = PositionalKeyCodec::new();
    let key = codec
        .generate_key(&Query::opaque("SELECT * FROM t WHERE a = 1 | 2"))
        .unwrap();
    assert_eq!(key.as_str(), "OBJ|SELECT * FROM t WHERE a = 1 / 2");
    assert!(key.is_opaque());
    assert!(matches!(
        codec.reconstruct_query(key.as_str()),
        Err(Error::ReconstructionUnsupported { .. })
    ));
}

#[test]
fn test_unescaped_delimiters_in_values_are_ambiguous() {
    // Without escaping, a ';' inside a value splits into an extra pair.
    let codec = PositionalKeyCodec::new();
    let query = Query::table("t").filter("note", "a;b=c").build();
    let key = codec.generate_key(&query).unwrap();
    assert_eq!(key.as_str(), "t|note=a;b=c");

    let rebuilt = codec.reconstruct_query(key.as_str()).unwrap();
    assert_eq!(rebuilt.field("note"), Some(&json!("a")));
    assert_eq!(rebuilt.field("b"), Some(&json!("c")));
}

#[test]
fn test_percent_escaping_keeps_values_intact() {
    let codec = PositionalKeyCodec::with_config(
        KeyCodecConfig::new().with_escaping(EscapeMode::Percent),
    );
    let query = Query::table("t").filter("note", "a;b=c").build();
    let key = codec.generate_key(&query).unwrap();
    assert_eq!(key.as_str(), "t|note=a%3Bb%3Dc");
    assert_eq!(codec.reconstruct_query(key.as_str()).unwrap(), query);

    // Keys without reserved characters are unchanged by escaping.
    assert_eq!(
        codec
            .generate_key(&Query::table("users").filter("id", 123).build())
            .unwrap()
            .as_str(),
        "users|id=123"
    );
}

#[test]
fn test_nested_values_fail_to_encode() {
    let err = PositionalKeyCodec::new()
        .generate_key(&Query::from_json(
            json!({"table": "t", "filter": {"op": "gt", "value": 1}}),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::KeyEncoding { .. }));
}
