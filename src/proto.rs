//! Riemann protocol buffer messages.
//!
//! These mirror the `proto.proto` schema shipped with Riemann (proto2 syntax),
//! keeping the original field numbers so that encoded messages are accepted by
//! unmodified Riemann servers and clients.

/// Deprecated state record. Declared for schema completeness only.
#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct State {
    #[prost(int64, optional, tag = "1")]
    pub time: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub state: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub service: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub host: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(bool, optional, tag = "6")]
    pub once: Option<bool>,
    #[prost(string, repeated, tag = "7")]
    pub tags: Vec<String>,
    #[prost(float, optional, tag = "8")]
    pub ttl: Option<f32>,
}

/// A Riemann event, the structured form of a single measurement.
#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Event {
    #[prost(int64, optional, tag = "1")]
    pub time: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub state: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub service: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub host: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(string, repeated, tag = "7")]
    pub tags: Vec<String>,
    #[prost(float, optional, tag = "8")]
    pub ttl: Option<f32>,
    #[prost(message, repeated, tag = "9")]
    pub attributes: Vec<Attribute>,
    #[prost(int64, optional, tag = "10")]
    pub time_micros: Option<i64>,
    #[prost(sint64, optional, tag = "13")]
    pub metric_sint64: Option<i64>,
    #[prost(double, optional, tag = "14")]
    pub metric_d: Option<f64>,
    #[prost(float, optional, tag = "15")]
    pub metric_f: Option<f32>,
}

/// Query envelope. This adapter never issues queries.
#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Query {
    #[prost(string, optional, tag = "1")]
    pub string: Option<String>,
}

/// The top level Riemann message.
///
/// Outbound messages carry `events` only; replies carry `ok` and optionally
/// `error`.
#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Msg {
    #[prost(bool, optional, tag = "2")]
    pub ok: Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
    #[prost(message, repeated, tag = "4")]
    pub states: Vec<State>,
    #[prost(message, optional, tag = "5")]
    pub query: Option<Query>,
    #[prost(message, repeated, tag = "6")]
    pub events: Vec<Event>,
}

/// A custom key/value pair on an [`Event`].
///
/// `value` is optional on the wire. An attribute without one cannot be
/// turned into a generic event attribute and fails translation.
#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Attribute {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

impl Msg {
    /// Builds an outbound message carrying `events` and nothing else.
    pub fn with_events(events: Vec<Event>) -> Self {
        Msg {
            events,
            ..Default::default()
        }
    }

    /// Builds a positive acknowledgement.
    ///
    /// Named apart from `ok()`, the field accessor the derive generates.
    pub fn ack() -> Self {
        Msg {
            ok: Some(true),
            ..Default::default()
        }
    }

    /// Builds a negative acknowledgement carrying `error`.
    pub fn nack(error: impl Into<String>) -> Self {
        Msg {
            ok: Some(false),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Whether this reply acknowledges success. A reply without `ok` is not
    /// a success.
    pub fn is_ok(&self) -> bool {
        self.ok == Some(true)
    }
}
