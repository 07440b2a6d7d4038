/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::*;

#[test]
fn names() {
    let features = Element::with_namespace("stream:features", "http://etherx.jabber.org/streams");
    assert_eq!(features.name(), "stream:features");
    assert_eq!(features.local_name(), "features");
    assert_eq!(features.prefix(), Some("stream"));
    assert!(features.is("features", "http://etherx.jabber.org/streams"));
    assert_eq!(
        features.qualified_name(),
        "{http://etherx.jabber.org/streams}features"
    );
    assert_eq!(
        features.get_attribute("xmlns:stream"),
        Some("http://etherx.jabber.org/streams")
    );

    let iq = Element::new("iq");
    assert_eq!(iq.prefix(), None);
    assert_eq!(iq.namespace(), None);
    assert!(!iq.is("iq", "jabber:client"));
    assert_eq!(iq.qualified_name(), "iq");
}

#[test]
fn attributes() {
    let mut iq = Element::new("iq").attr("type", "get").attr("id", "a1");
    assert_eq!(iq.get_attribute("type"), Some("get"));
    assert!(iq.has_attribute("id"));
    assert!(!iq.has_attribute("to"));

    iq.set_attribute("type", Some("result"));
    iq.set_attribute("to", Some("a@b"));
    iq.set_attribute("id", None);
    iq.set_attribute("missing", None);
    let attributes: Vec<_> = iq.attributes().collect();
    assert_eq!(attributes, vec![("type", "result"), ("to", "a@b")]);
}

#[test]
fn children_inherit_namespace() {
    let mut iq = Element::with_namespace("iq", "jabber:client");
    let bind = iq.add_child(Element::with_namespace("bind", "urn:ietf:params:xml:ns:xmpp-bind"));
    bind.add_child(Element::new("resource")).set_value(Some("home"));
    let error = iq.add_child(Element::new("error"));
    assert_eq!(error.namespace(), Some("jabber:client"));

    let resource = iq
        .get_child("bind", Some("urn:ietf:params:xml:ns:xmpp-bind"))
        .and_then(|bind| bind.get_child("resource", None))
        .unwrap();
    assert_eq!(resource.namespace(), Some("urn:ietf:params:xml:ns:xmpp-bind"));
    assert_eq!(resource.value(), Some("home"));
}

#[test]
fn subtree_inherits_when_attached() {
    let query = Element::new("query")
        .attr("xmlns", "jabber:iq:roster")
        .child(Element::new("item").child(Element::new("group")));
    let iq = Element::with_namespace("iq", "jabber:client").child(query);
    let query = iq.first_child().unwrap();
    assert_eq!(query.namespace(), Some("jabber:iq:roster"));
    let group = &query.children()[0].children()[0];
    assert_eq!(group.namespace(), Some("jabber:iq:roster"));
}

#[test]
fn removed_child_keeps_namespace() {
    let mut stanza: Element = "<message xmlns='jabber:client'><body>hi</body>\
        <x xmlns='jabber:x:oob'><url>u</url></x></message>"
        .parse()
        .unwrap();
    let body = stanza.remove_child(0).unwrap();
    assert_eq!(body.namespace(), Some("jabber:client"));
    assert_eq!(body.to_string(), "<body xmlns=\"jabber:client\">hi</body>");

    let oob = stanza.remove_tag("x", Some("jabber:x:oob")).unwrap();
    assert_eq!(oob.children()[0].namespace(), Some("jabber:x:oob"));
    assert!(stanza.children().is_empty());
    assert_eq!(stanza.remove_child(0), None);
}

#[test]
fn tags() {
    let mut message = Element::with_namespace("message", "jabber:client");
    assert_eq!(message.get_tag("body", None), None);
    message.set_tag("body", None, Some("first"));
    assert_eq!(message.get_tag("body", None), Some("first"));
    message.set_tag("body", None, Some("second"));
    assert_eq!(message.children().len(), 1);
    assert_eq!(message.get_tag("body", Some("jabber:client")), Some("second"));

    message.set_tag("thread", Some("urn:other"), Some("t1"));
    assert!(message.has_tag("thread", Some("urn:other")));
    assert!(!message.has_tag("thread", Some("jabber:client")));

    message.set_tag("body", None, None);
    assert!(!message.has_tag("body", None));
    assert_eq!(message.children().len(), 1);
}

#[test]
fn set_namespace_updates_declaration() {
    let mut query = Element::new("query").attr("xmlns", "jabber:iq:version");
    query.set_namespace("jabber:iq:last");
    assert_eq!(query.get_attribute("xmlns"), Some("jabber:iq:last"));
    assert_eq!(query.namespace(), Some("jabber:iq:last"));

    let mut plain = Element::new("query");
    plain.set_namespace("jabber:iq:time");
    assert!(!plain.has_attribute("xmlns"));
    assert_eq!(plain.to_string(), "<query xmlns=\"jabber:iq:time\"/>");
}

#[test]
fn serialize() {
    let iq = Element::with_namespace("iq", "jabber:client")
        .attr("type", "set")
        .attr("id", "b&1")
        .child(
            Element::with_namespace("bind", "urn:ietf:params:xml:ns:xmpp-bind")
                .child(Element::new("resource").text("<home>")),
        );
    let expected = "<iq xmlns=\"jabber:client\" type=\"set\" id=\"b&amp;1\">\
        <bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\">\
        <resource>&lt;home&gt;</resource></bind></iq>";
    assert_eq!(iq.to_string(), expected);
    assert_eq!(iq.str_size(), expected.len());
    assert_eq!(format!("{iq}"), expected);
}

#[test]
fn serialize_prefixed() {
    let features = Element::with_namespace("stream:features", "http://etherx.jabber.org/streams")
        .child(Element::with_namespace("starttls", "urn:ietf:params:xml:ns:xmpp-tls"));
    let expected = "<stream:features xmlns:stream=\"http://etherx.jabber.org/streams\">\
        <starttls xmlns=\"urn:ietf:params:xml:ns:xmpp-tls\"/></stream:features>";
    assert_eq!(features.to_string(), expected);
    assert_eq!(features.str_size(), expected.len());
}

#[test]
fn start_tag() {
    let header = Element::with_namespace("stream:stream", "http://etherx.jabber.org/streams")
        .attr("xmlns", "jabber:client")
        .attr("version", "1.0");
    assert_eq!(
        header.start_tag(),
        "<stream:stream xmlns:stream=\"http://etherx.jabber.org/streams\" \
         xmlns=\"jabber:client\" version=\"1.0\">"
    );
}

#[test]
fn parse_round_trip() {
    let text = "<presence xmlns=\"jabber:client\" from=\"a@b/c\">\
        <show>away</show><status>out &amp; about</status></presence>";
    let presence: Element = text.parse().unwrap();
    assert_eq!(presence.get_tag("status", None), Some("out & about"));
    assert_eq!(presence.to_string(), text);
}

#[test]
fn parse_errors() {
    assert!("<a/><b/>".parse::<Element>().is_err());
    assert!("".parse::<Element>().is_err());
    assert!("<a><b></a>".parse::<Element>().is_err());
    assert!("<a>".parse::<Element>().is_err());
}

#[test]
fn cursor_navigation() {
    let roster: Element = "<iq type='result' id='r1'><query xmlns='jabber:iq:roster'>\
        <item jid='romeo@example.net'><group>Friends</group></item>\
        <item jid='mercutio@example.org'/></query></iq>"
        .parse()
        .unwrap();
    let mut cursor = roster.cursor();
    assert_eq!(cursor.parent(), None);
    assert!(!cursor.up());
    assert!(!cursor.next_sibling());

    assert!(cursor.down_tag("query", Some("jabber:iq:roster")));
    assert!(cursor.down(0));
    assert_eq!(cursor.depth(), 2);
    assert_eq!(cursor.element().get_attribute("jid"), Some("romeo@example.net"));
    assert_eq!(cursor.parent().map(Element::local_name), Some("query"));

    assert!(cursor.down_tag("group", None));
    assert_eq!(cursor.element().value(), Some("Friends"));
    assert!(!cursor.next_sibling());
    assert!(cursor.up());

    assert!(cursor.next_sibling());
    assert_eq!(
        cursor.element().get_attribute("jid"),
        Some("mercutio@example.org")
    );
    assert!(!cursor.next_sibling());
    assert!(!cursor.down(0));

    assert!(cursor.up());
    assert!(cursor.up());
    assert_eq!(cursor.element().get_attribute("id"), Some("r1"));
    assert_eq!(cursor.depth(), 0);
}
