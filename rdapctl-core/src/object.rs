//! Decoding of RDAP responses into typed object classes.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{RdapError, Result};
use crate::types::{Autnum, Domain, Entity, IpNetwork, Nameserver};

/// The closed set of RFC 9083 object classes, discriminated by
/// `objectClassName`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RdapObject {
    Entity(Entity),
    Domain(Domain),
    Nameserver(Nameserver),
    IpNetwork(IpNetwork),
    Autnum(Autnum),
}

impl RdapObject {
    /// The `objectClassName` as received, original spelling preserved.
    pub fn object_class_name(&self) -> &str {
        match self {
            RdapObject::Entity(v) => &v.common.object_class_name,
            RdapObject::Domain(v) => &v.common.object_class_name,
            RdapObject::Nameserver(v) => &v.common.object_class_name,
            RdapObject::IpNetwork(v) => &v.common.object_class_name,
            RdapObject::Autnum(v) => &v.common.object_class_name,
        }
    }

    pub fn handle(&self) -> Option<&str> {
        let common = match self {
            RdapObject::Entity(v) => &v.common,
            RdapObject::Domain(v) => &v.common,
            RdapObject::Nameserver(v) => &v.common,
            RdapObject::IpNetwork(v) => &v.common,
            RdapObject::Autnum(v) => &v.common,
        };
        common.handle.as_deref()
    }
}

fn class_matches(got: &str, want: &str) -> bool {
    got.eq_ignore_ascii_case(want)
}

/// Dispatches on `objectClassName` (case-insensitive) and decodes the map
/// into the matching typed class. The decoded class name is checked again
/// afterwards to guard against maps mutated between the two steps.
pub fn parse_object(raw: &Map<String, Value>) -> Result<RdapObject> {
    if raw.is_empty() {
        return Err(RdapError::NilObject);
    }
    let class = raw
        .get("objectClassName")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let value = Value::Object(raw.clone());

    match class.to_ascii_lowercase().as_str() {
        "entity" => {
            let v: Entity = serde_json::from_value(value)?;
            if !class_matches(&v.common.object_class_name, "entity") {
                return Err(RdapError::UnexpectedObjectClass {
                    expected: "entity",
                    got: v.common.object_class_name,
                });
            }
            Ok(RdapObject::Entity(v))
        }
        "domain" => {
            let v: Domain = serde_json::from_value(value)?;
            if !class_matches(&v.common.object_class_name, "domain") {
                return Err(RdapError::UnexpectedObjectClass {
                    expected: "domain",
                    got: v.common.object_class_name,
                });
            }
            Ok(RdapObject::Domain(v))
        }
        "nameserver" => {
            let v: Nameserver = serde_json::from_value(value)?;
            if !class_matches(&v.common.object_class_name, "nameserver") {
                return Err(RdapError::UnexpectedObjectClass {
                    expected: "nameserver",
                    got: v.common.object_class_name,
                });
            }
            Ok(RdapObject::Nameserver(v))
        }
        "ip network" => {
            let v: IpNetwork = serde_json::from_value(value)?;
            if !class_matches(&v.common.object_class_name, "ip network") {
                return Err(RdapError::UnexpectedObjectClass {
                    expected: "ip network",
                    got: v.common.object_class_name,
                });
            }
            Ok(RdapObject::IpNetwork(v))
        }
        "autnum" => {
            let v: Autnum = serde_json::from_value(value)?;
            if !class_matches(&v.common.object_class_name, "autnum") {
                return Err(RdapError::UnexpectedObjectClass {
                    expected: "autnum",
                    got: v.common.object_class_name,
                });
            }
            Ok(RdapObject::Autnum(v))
        }
        _ => Err(RdapError::UnknownObjectClass(class.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn dispatches_all_known_classes() {
        let cases = [
            (json!({"objectClassName": "entity", "handle": "E"}), "entity"),
            (
                json!({"objectClassName": "DoMaIn", "ldhName": "example.com"}),
                "domain",
            ),
            (
                json!({"objectClassName": "nameserver", "ldhName": "ns1.example.com"}),
                "nameserver",
            ),
            (
                json!({"objectClassName": "ip network", "ipVersion": "v4"}),
                "ip network",
            ),
            (
                json!({"objectClassName": "autnum", "startAutnum": 64512}),
                "autnum",
            ),
        ];
        for (raw, want) in cases {
            let obj = parse_object(&map(raw)).unwrap();
            assert!(obj.object_class_name().eq_ignore_ascii_case(want));
        }
    }

    #[test]
    fn original_spelling_is_preserved() {
        let obj = parse_object(&map(json!({"objectClassName": "DoMaIn"}))).unwrap();
        assert_eq!(obj.object_class_name(), "DoMaIn");
    }

    #[test]
    fn rejects_empty_unknown_and_missing() {
        assert!(matches!(
            parse_object(&Map::new()),
            Err(RdapError::NilObject)
        ));

        match parse_object(&map(json!({"objectClassName": "weird"}))) {
            Err(RdapError::UnknownObjectClass(name)) => assert_eq!(name, "weird"),
            other => panic!("expected unknown class, got {other:?}"),
        }

        // Missing objectClassName dispatches as the empty string.
        match parse_object(&map(json!({"ldhName": "example.com"}))) {
            Err(RdapError::UnknownObjectClass(name)) => assert_eq!(name, ""),
            other => panic!("expected unknown class, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_all_classes_through_serialization() {
        let domain = RdapObject::Domain(crate::types::Domain {
            common: crate::types::Common {
                object_class_name: "domain".into(),
                handle: Some("EXAMPLE-1".into()),
                status: vec!["active".into()],
                ..Default::default()
            },
            ldh_name: Some("example.com".into()),
            secure_dns: Some(crate::types::SecureDns {
                zone_signed: Some(true),
                delegation_signed: Some(true),
                ds_data: vec![crate::types::DsData {
                    key_tag: 12345,
                    algorithm: 13,
                    digest: "aabbcc".into(),
                    digest_type: 2,
                    ..Default::default()
                }],
                ..Default::default()
            }),
            nameservers: vec![crate::types::Nameserver {
                common: crate::types::Common {
                    object_class_name: "nameserver".into(),
                    ..Default::default()
                },
                ldh_name: Some("ns1.example.com".into()),
                ip_addresses: Some(crate::types::IpAddresses {
                    v4: vec!["192.0.2.1".into()],
                    v6: vec![],
                }),
                ..Default::default()
            }],
            ..Default::default()
        });

        let entity = RdapObject::Entity(crate::types::Entity {
            common: crate::types::Common {
                object_class_name: "entity".into(),
                handle: Some("ORG-EXAMPLE1".into()),
                ..Default::default()
            },
            roles: vec!["registrant".into()],
            vcard_array: Some(json!(["vcard", [["version", {}, "text", "4.0"]]])),
            ..Default::default()
        });

        let nameserver = RdapObject::Nameserver(crate::types::Nameserver {
            common: crate::types::Common {
                object_class_name: "nameserver".into(),
                ..Default::default()
            },
            ldh_name: Some("ns1.example.com".into()),
            ..Default::default()
        });

        let network = RdapObject::IpNetwork(crate::types::IpNetwork {
            common: crate::types::Common {
                object_class_name: "ip network".into(),
                handle: Some("NET-192-0-2-0-1".into()),
                ..Default::default()
            },
            start_address: Some("192.0.2.0".into()),
            end_address: Some("192.0.2.255".into()),
            ip_version: Some("v4".into()),
            ..Default::default()
        });

        let autnum = RdapObject::Autnum(crate::types::Autnum {
            common: crate::types::Common {
                object_class_name: "autnum".into(),
                handle: Some("AS65536".into()),
                ..Default::default()
            },
            start_autnum: Some(65536),
            end_autnum: Some(65551),
            ..Default::default()
        });

        for original in [domain, entity, nameserver, network, autnum] {
            let serialized = serde_json::to_value(&original).unwrap();
            let raw = match serialized {
                Value::Object(map) => map,
                other => panic!("expected object, got {other}"),
            };
            let reparsed = parse_object(&raw).unwrap();
            assert_eq!(reparsed, original);
        }
    }

    #[test]
    fn secure_dns_uses_rfc_spelling() {
        let domain = crate::types::Domain {
            common: crate::types::Common {
                object_class_name: "domain".into(),
                ..Default::default()
            },
            secure_dns: Some(crate::types::SecureDns::default()),
            ..Default::default()
        };
        let value = serde_json::to_value(&domain).unwrap();
        assert!(value.get("secureDNS").is_some());
        assert!(value.get("secureDns").is_none());
    }
}
