//! Mapping between [`GenericEvent`] and the Riemann [`Event`].
//!
//! Both directions are pure. Fields absent on the source stay absent on the
//! target, and empty tag or attribute collections are never put on the wire.

use crate::config::HandlerConfig;
use crate::error::TranslateError;
use crate::event::{GenericEvent, Value, EVENT_TYPE};
use crate::proto::{Attribute, Event};
use std::collections::{BTreeMap, BTreeSet};

/// Builds the wire event for `event`, merged with the handler defaults.
///
/// Tags are the union of the default and event tags. Attributes start from
/// the defaults and are overridden by the event on key collision. `defaults`
/// is only read; every merged collection is a fresh copy.
pub fn to_structured(
    defaults: &HandlerConfig,
    event: &GenericEvent,
) -> Result<Event, TranslateError> {
    let mut tags: BTreeSet<String> = defaults.tags().clone();
    if let Some(event_tags) = &event.tags {
        tags.extend(event_tags.iter().cloned());
    }

    let mut attributes: BTreeMap<String, String> = defaults.attributes().clone();
    if let Some(event_attributes) = &event.attributes {
        attributes.extend(
            event_attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    let mut e = Event {
        service: event.key.clone(),
        host: event.host.clone(),
        state: event.state.clone(),
        description: event.description.clone(),
        ttl: event.ttl,
        time: event.time,
        tags: tags.into_iter().collect(),
        attributes: attributes
            .into_iter()
            .map(|(key, value)| Attribute {
                key,
                value: Some(value),
            })
            .collect(),
        ..Default::default()
    };

    if let Some(value) = &event.value {
        set_metric(&mut e, value)?;
    }

    Ok(e)
}

/// Builds the generic event for a wire event received from a peer.
///
/// Repeated attribute keys resolve to the last value, repeated tags collapse.
/// `time` falls back to `time_micros`, truncated to whole seconds, when a
/// client only sends the latter.
pub fn to_generic(event: &Event) -> Result<GenericEvent, TranslateError> {
    let attributes = if event.attributes.is_empty() {
        None
    } else {
        let mut attributes = BTreeMap::new();
        for attr in &event.attributes {
            let value = attr
                .value
                .clone()
                .ok_or_else(|| TranslateError::MissingAttributeValue(attr.key.clone()))?;
            attributes.insert(attr.key.clone(), value);
        }
        Some(attributes)
    };

    let tags = if event.tags.is_empty() {
        None
    } else {
        Some(event.tags.iter().cloned().collect())
    };

    Ok(GenericEvent {
        kind: EVENT_TYPE.to_owned(),
        key: event.service.clone(),
        value: metric(event),
        host: event.host.clone(),
        state: event.state.clone(),
        description: event.description.clone(),
        ttl: event.ttl,
        time: event.time.or(event.time_micros.map(|micros| micros.div_euclid(1_000_000))),
        tags,
        attributes,
    })
}

fn set_metric(e: &mut Event, value: &Value) -> Result<(), TranslateError> {
    match value {
        Value::Int(v) => {
            e.metric_sint64 = Some(*v);
            e.metric_f = Some(*v as f32);
        }
        Value::Float(v) => {
            e.metric_d = Some(*v);
            e.metric_f = Some(*v as f32);
        }
        Value::Text(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return set_metric(e, &Value::Int(v));
            }
            let v = trimmed
                .parse::<f64>()
                .map_err(|_| TranslateError::NonNumericMetric(s.clone()))?;
            return set_metric(e, &Value::Float(v));
        }
    }
    Ok(())
}

fn metric(e: &Event) -> Option<Value> {
    if let Some(v) = e.metric_sint64 {
        return Some(Value::Int(v));
    }
    if let Some(v) = e.metric_d {
        return Some(Value::Float(v));
    }
    e.metric_f.map(|v| Value::Float(f64::from(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> HandlerConfig {
        HandlerConfig::new(["env"], [("dc", "us")])
    }

    #[test]
    fn merges_defaults() {
        let event = GenericEvent::new()
            .with_key("cpu")
            .with_value(0.5)
            .with_host("a")
            .with_tag("prod");

        let e = to_structured(&defaults(), &event).unwrap();
        assert_eq!(e.service.as_deref(), Some("cpu"));
        assert_eq!(e.metric_d, Some(0.5));
        assert_eq!(e.host.as_deref(), Some("a"));
        assert_eq!(e.tags, vec!["env".to_owned(), "prod".to_owned()]);
        assert_eq!(
            e.attributes,
            vec![Attribute {
                key: "dc".to_owned(),
                value: Some("us".to_owned()),
            }]
        );
        assert_eq!(e.state, None);
        assert_eq!(e.ttl, None);
        assert_eq!(e.time, None);
        assert_eq!(e.description, None);
    }

    #[test]
    fn event_attributes_win() {
        let event = GenericEvent::new().with_attribute("dc", "eu");
        let e = to_structured(&defaults(), &event).unwrap();
        assert_eq!(e.attributes.len(), 1);
        assert_eq!(e.attributes[0].value.as_deref(), Some("eu"));
    }

    #[test]
    fn defaults_are_not_mutated() {
        let config = defaults();
        let before = config.clone();

        let first = GenericEvent::new()
            .with_attribute("dc", "eu")
            .with_attribute("rack", "1")
            .with_tag("a");
        let second = GenericEvent::new().with_attribute("dc", "ap");

        let a = to_structured(&config, &first).unwrap();
        let b = to_structured(&config, &second).unwrap();

        assert_eq!(config, before);
        assert_eq!(a.attributes.len(), 2);
        assert_eq!(b.attributes.len(), 1);
        assert_eq!(b.attributes[0].value.as_deref(), Some("ap"));
        assert_eq!(b.tags, vec!["env".to_owned()]);
    }

    #[test]
    fn empty_collections_are_omitted() {
        let config = HandlerConfig::default();
        let event = GenericEvent::new().with_key("cpu");
        let e = to_structured(&config, &event).unwrap();
        assert!(e.tags.is_empty());
        assert!(e.attributes.is_empty());

        let back = to_generic(&e).unwrap();
        assert_eq!(back.tags, None);
        assert_eq!(back.attributes, None);
    }

    #[test]
    fn round_trip_preserves_scalars() {
        let event = GenericEvent::new()
            .with_key("disk")
            .with_value(42i64)
            .with_host("b")
            .with_state("warning")
            .with_description("almost full")
            .with_ttl(60.0)
            .with_time(1_700_000_000)
            .with_tag("prod");

        let back = to_generic(&to_structured(&defaults(), &event).unwrap()).unwrap();
        assert_eq!(back.kind, "event");
        assert_eq!(back.key, event.key);
        assert_eq!(back.value, Some(Value::Int(42)));
        assert_eq!(back.host, event.host);
        assert_eq!(back.state, event.state);
        assert_eq!(back.description, event.description);
        assert_eq!(back.ttl, event.ttl);
        assert_eq!(back.time, event.time);

        let tags: BTreeSet<String> = ["env", "prod"].iter().map(|s| s.to_string()).collect();
        assert_eq!(back.tags, Some(tags));
    }

    #[test]
    fn time_from_micros() {
        let e = Event {
            service: Some("cpu".to_owned()),
            time_micros: Some(1_700_000_000_250_000),
            ..Default::default()
        };
        assert_eq!(to_generic(&e).unwrap().time, Some(1_700_000_000));

        let e = Event {
            time: Some(42),
            time_micros: Some(1_700_000_000_250_000),
            ..Default::default()
        };
        assert_eq!(to_generic(&e).unwrap().time, Some(42));

        assert_eq!(to_generic(&Event::default()).unwrap().time, None);
    }

    #[test]
    fn text_metrics() {
        let config = HandlerConfig::default();

        let e = to_structured(&config, &GenericEvent::new().with_value("7")).unwrap();
        assert_eq!(e.metric_sint64, Some(7));

        let e = to_structured(&config, &GenericEvent::new().with_value("1.5")).unwrap();
        assert_eq!(e.metric_d, Some(1.5));

        let err = to_structured(&config, &GenericEvent::new().with_value("high")).unwrap_err();
        assert_eq!(err, TranslateError::NonNumericMetric("high".to_owned()));
    }

    #[test]
    fn metric_precedence() {
        let e = Event {
            metric_f: Some(1.0),
            ..Default::default()
        };
        assert_eq!(to_generic(&e).unwrap().value, Some(Value::Float(1.0)));

        let e = Event {
            metric_d: Some(2.5),
            metric_f: Some(2.5),
            ..Default::default()
        };
        assert_eq!(to_generic(&e).unwrap().value, Some(Value::Float(2.5)));

        let e = Event {
            metric_sint64: Some(3),
            metric_d: Some(9.0),
            ..Default::default()
        };
        assert_eq!(to_generic(&e).unwrap().value, Some(Value::Int(3)));
    }

    #[test]
    fn duplicate_wire_attributes_last_wins() {
        let e = Event {
            attributes: vec![
                Attribute {
                    key: "dc".to_owned(),
                    value: Some("us".to_owned()),
                },
                Attribute {
                    key: "dc".to_owned(),
                    value: Some("eu".to_owned()),
                },
            ],
            tags: vec!["x".to_owned(), "x".to_owned()],
            ..Default::default()
        };
        let generic = to_generic(&e).unwrap();
        let attributes = generic.attributes.unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes["dc"], "eu");
        assert_eq!(generic.tags.unwrap().len(), 1);
    }

    #[test]
    fn attribute_without_value() {
        let e = Event {
            attributes: vec![Attribute {
                key: "dc".to_owned(),
                value: None,
            }],
            ..Default::default()
        };
        assert_eq!(
            to_generic(&e),
            Err(TranslateError::MissingAttributeValue("dc".to_owned()))
        );
    }
}
