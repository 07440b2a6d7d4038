/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Constructors and inspectors for the stream negotiation elements.

use crate::Element;
use crate::constants::ERROR_TAG;
use crate::constants::FEATURES_TAG;
use crate::constants::STREAM_TAG;
use crate::constants::ns;

use super::condition::SaslCondition;
use super::condition::StanzaCondition;
use super::condition::StreamCondition;

/// Header of an outgoing stream. Only the start tag is ever sent.
pub fn stream_header(
    default_namespace: &str,
    from: Option<&str>,
    to: Option<&str>,
    id: Option<&str>,
) -> Element {
    let mut header =
        Element::with_namespace(STREAM_TAG, ns::STREAM).attr("xmlns", default_namespace);
    header.set_attribute("from", from);
    header.set_attribute("to", to);
    header.set_attribute("id", id);
    header.attr("version", "1.0")
}

pub fn features() -> Element {
    Element::with_namespace(FEATURES_TAG, ns::STREAM)
}

pub fn stream_error(condition: StreamCondition, text: Option<&str>) -> Element {
    let mut error = Element::with_namespace(ERROR_TAG, ns::STREAM);
    error.add_child(Element::with_namespace(condition.as_str(), ns::STREAMS));
    if let Some(text) = text {
        error.add_child(Element::with_namespace("text", ns::STREAMS).text(text));
    }
    error
}

/// Condition and text of a received `<stream:error>`.
pub fn parse_stream_error(error: &Element) -> (StreamCondition, Option<String>) {
    let mut condition = StreamCondition::UndefinedCondition;
    let mut text = None;
    for child in error.children() {
        if child.namespace() != Some(ns::STREAMS) {
            continue;
        }
        if child.local_name() == "text" {
            text = child.value().map(str::to_string);
        } else if let Ok(found) = child.local_name().parse() {
            condition = found;
        }
    }
    (condition, text)
}

pub fn starttls(required: bool) -> Element {
    let mut starttls = Element::with_namespace("starttls", ns::TLS);
    if required {
        starttls.add_child(Element::new("required"));
    }
    starttls
}

pub fn proceed() -> Element {
    Element::with_namespace("proceed", ns::TLS)
}

pub fn mechanisms<'a>(names: impl IntoIterator<Item = &'a str>) -> Element {
    let mut mechanisms = Element::with_namespace("mechanisms", ns::SASL);
    for name in names {
        mechanisms.add_child(Element::new("mechanism").text(name));
    }
    mechanisms
}

/// A SASL element like `<auth/>`, `<response/>` or `<success/>`.
///
/// Empty data is sent as `=` as required by RFC 6120 section 6.4.2.
pub fn sasl(name: &str, data: Option<&str>) -> Element {
    let mut element = Element::with_namespace(name, ns::SASL);
    if let Some(data) = data {
        element.set_value(Some(if data.is_empty() { "=" } else { data }));
    }
    element
}

pub fn auth(mechanism: &str, data: Option<&str>) -> Element {
    sasl("auth", data).attr("mechanism", mechanism)
}

pub fn sasl_failure(condition: SaslCondition, text: Option<&str>) -> Element {
    let mut failure = Element::with_namespace("failure", ns::SASL);
    failure.add_child(Element::new(condition.as_str()));
    if let Some(text) = text {
        failure.add_child(Element::new("text").text(text));
    }
    failure
}

/// Condition and text of a received SASL `<failure/>`.
pub fn parse_sasl_failure(failure: &Element) -> (SaslCondition, Option<String>) {
    let mut condition = SaslCondition::NotAuthorized;
    let mut text = None;
    for child in failure.children() {
        if child.local_name() == "text" {
            text = child.value().map(str::to_string);
        } else if let Ok(found) = child.local_name().parse() {
            condition = found;
        }
    }
    (condition, text)
}

/// Decoded data of a SASL element, with `=` standing for empty data.
pub fn sasl_data(element: &Element) -> Option<&str> {
    match element.value().map(str::trim) {
        Some("=") => Some(""),
        Some("") | None => None,
        Some(data) => Some(data),
    }
}

pub fn bind_feature() -> Element {
    Element::with_namespace("bind", ns::BIND)
}

pub fn session_feature(optional: bool) -> Element {
    let mut session = Element::with_namespace("session", ns::SESSION);
    if optional {
        session.add_child(Element::new("optional"));
    }
    session
}

pub fn iq(kind: &str, id: &str) -> Element {
    Element::with_namespace("iq", ns::CLIENT)
        .attr("type", kind)
        .attr("id", id)
}

pub fn bind_request(id: &str, resource: Option<&str>) -> Element {
    let mut bind = Element::with_namespace("bind", ns::BIND);
    if let Some(resource) = resource {
        bind.add_child(Element::new("resource").text(resource));
    }
    iq("set", id).child(bind)
}

pub fn bind_result(id: &str, jid: &str) -> Element {
    iq("result", id)
        .child(Element::with_namespace("bind", ns::BIND).child(Element::new("jid").text(jid)))
}

pub fn session_request(id: &str) -> Element {
    iq("set", id).child(Element::with_namespace("session", ns::SESSION))
}

/// Component handshake, the digest from the component and empty from the server.
pub fn handshake(digest: Option<&str>) -> Element {
    let mut handshake = Element::new("handshake");
    handshake.set_value(digest);
    handshake
}

/// Empty result for an iq request.
pub fn iq_result(request: &Element) -> Element {
    let mut result = iq("result", request.get_attribute("id").unwrap_or_default());
    result.set_attribute("to", request.get_attribute("from"));
    result.set_attribute("from", request.get_attribute("to"));
    result
}

/// True for stanzas that must never be answered.
pub fn is_response(stanza: &Element) -> bool {
    matches!(stanza.get_attribute("type"), Some("error" | "result"))
}

/// Error reply for a stanza.
///
/// The reply keeps the element name and id of the stanza, and swaps its
/// addresses.
pub fn stanza_error(stanza: &Element, condition: StanzaCondition) -> Element {
    let mut reply = Element::new(stanza.name());
    if let Some(namespace) = stanza.namespace() {
        reply.set_namespace(namespace);
    }
    reply.set_attribute("to", stanza.get_attribute("from"));
    reply.set_attribute("from", stanza.get_attribute("to"));
    reply.set_attribute("type", Some("error"));
    reply.set_attribute("id", stanza.get_attribute("id"));
    let error = Element::new("error")
        .attr("type", condition.error_type())
        .child(Element::with_namespace(condition.as_str(), ns::STANZAS));
    reply.add_child(error);
    reply
}

/// Stanza error condition carried by an error reply.
pub fn parse_stanza_error(stanza: &Element) -> Option<StanzaCondition> {
    stanza
        .get_child("error", None)?
        .children()
        .iter()
        .filter(|child| child.namespace() == Some(ns::STANZAS))
        .find_map(|child| child.local_name().parse().ok())
}

/// Negotiation steps offered by a `<stream:features>` element.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FeatureSet {
    pub starttls: bool,
    pub starttls_required: bool,
    pub mechanisms: Vec<String>,
    pub bind: bool,
    pub session: bool,
    pub session_optional: bool,
}

impl FeatureSet {
    pub fn parse(features: &Element) -> FeatureSet {
        let mut set = FeatureSet::default();
        if let Some(starttls) = features.get_child("starttls", Some(ns::TLS)) {
            set.starttls = true;
            set.starttls_required = starttls.has_tag("required", None);
        }
        if let Some(mechanisms) = features.get_child("mechanisms", Some(ns::SASL)) {
            set.mechanisms = mechanisms
                .children()
                .iter()
                .filter(|child| child.local_name() == "mechanism")
                .filter_map(|child| child.value().map(|name| name.trim().to_string()))
                .collect();
        }
        set.bind = features.has_tag("bind", Some(ns::BIND));
        if let Some(session) = features.get_child("session", Some(ns::SESSION)) {
            set.session = true;
            set.session_optional = session.has_tag("optional", None);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header() {
        let header = stream_header(ns::CLIENT, None, Some("example.com"), None);
        assert_eq!(
            header.start_tag(),
            "<stream:stream xmlns:stream=\"http://etherx.jabber.org/streams\" \
             xmlns=\"jabber:client\" to=\"example.com\" version=\"1.0\">"
        );
    }

    #[test]
    fn features_round_trip() {
        let element = features()
            .child(starttls(true))
            .child(mechanisms(["PLAIN", "SCRAM-SHA-1"]));
        let parsed: Element = element.to_string().parse().unwrap();
        let set = FeatureSet::parse(&parsed);
        assert!(set.starttls && set.starttls_required);
        assert_eq!(set.mechanisms, vec!["PLAIN", "SCRAM-SHA-1"]);
        assert!(!set.bind);

        let set = FeatureSet::parse(&features().child(bind_feature()).child(session_feature(true)));
        assert!(set.bind && set.session && set.session_optional);
        assert!(!set.starttls);
        let set = FeatureSet::parse(&features().child(session_feature(false)));
        assert!(set.session && !set.session_optional);
    }

    #[test]
    fn error_reply() {
        let request: Element =
            "<iq xmlns='jabber:client' type='get' id='v1' from='a@b/c' to='b'>\
             <query xmlns='jabber:iq:version'/></iq>"
                .parse()
                .unwrap();
        assert!(!is_response(&request));
        let reply = stanza_error(&request, StanzaCondition::FeatureNotImplemented);
        assert_eq!(
            reply.to_string(),
            "<iq xmlns=\"jabber:client\" to=\"a@b/c\" from=\"b\" type=\"error\" id=\"v1\">\
             <error type=\"cancel\"><feature-not-implemented \
             xmlns=\"urn:ietf:params:xml:ns:xmpp-stanzas\"/></error></iq>"
        );
        assert!(is_response(&reply));
        assert_eq!(
            parse_stanza_error(&reply),
            Some(StanzaCondition::FeatureNotImplemented)
        );
    }

    #[test]
    fn failures() {
        let failure = sasl_failure(SaslCondition::NotAuthorized, Some("bad password"));
        let parsed: Element = failure.to_string().parse().unwrap();
        assert_eq!(
            parse_sasl_failure(&parsed),
            (SaslCondition::NotAuthorized, Some("bad password".to_string()))
        );

        let error = stream_error(StreamCondition::Conflict, None);
        assert_eq!(
            error.to_string(),
            "<stream:error xmlns:stream=\"http://etherx.jabber.org/streams\">\
             <conflict xmlns=\"urn:ietf:params:xml:ns:xmpp-streams\"/></stream:error>"
        );
        assert_eq!(parse_stream_error(&error), (StreamCondition::Conflict, None));
    }

    #[test]
    fn sasl_payloads() {
        assert_eq!(sasl("response", Some("")).value(), Some("="));
        assert_eq!(sasl_data(&sasl("response", Some(""))), Some(""));
        assert_eq!(sasl_data(&sasl("response", None)), None);
        assert_eq!(auth("PLAIN", Some("AGEAYg==")).get_attribute("mechanism"), Some("PLAIN"));
    }
}
