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

const HEADER: &str = "<stream:stream xmlns='jabber:client' \
    xmlns:stream='http://etherx.jabber.org/streams' to='example.com' version='1.0'>";

fn parse_chunks(chunks: &[&str]) -> Vec<StreamEvent> {
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    for chunk in chunks {
        parser.parse_bytes(chunk.as_bytes(), &mut events).unwrap();
    }
    events
}

fn stanza(event: &StreamEvent) -> &Element {
    match event {
        StreamEvent::Stanza(element) => element,
        _ => panic!("expected a stanza, got {event:?}"),
    }
}

#[test]
fn stream_open_and_close() {
    let events = parse_chunks(&[
        "<stream:stream xmlns:stream='http://etherx.jabber.org/streams' to='h'>",
        "</stream:stream>",
    ]);
    assert_eq!(events.len(), 2);
    match &events[0] {
        StreamEvent::Open(header) => {
            assert!(header.is("stream", ns::STREAM));
            assert_eq!(header.get_attribute("to"), Some("h"));
            assert!(header.children().is_empty());
        }
        event => panic!("expected stream open, got {event:?}"),
    }
    assert_eq!(events[1], StreamEvent::Close);
}

#[test]
fn empty_stream_header() {
    let events = parse_chunks(&["<stream:stream xmlns:stream='http://etherx.jabber.org/streams'/>"]);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamEvent::Open(_)));
    assert_eq!(events[1], StreamEvent::Close);
}

#[test]
fn empty_stanza() {
    let events = parse_chunks(&["<iq id=\"1\" type=\"get\"/>"]);
    assert_eq!(events.len(), 1);
    let iq = stanza(&events[0]);
    assert_eq!(iq.local_name(), "iq");
    assert_eq!(iq.get_attribute("id"), Some("1"));
    assert_eq!(iq.get_attribute("type"), Some("get"));
    assert!(iq.children().is_empty());
    assert_eq!(iq.namespace(), Some(ns::CLIENT));
}

#[test]
fn stanza_across_calls() {
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    parser.parse_bytes(b"<message><body>Hi", &mut events).unwrap();
    assert!(events.is_empty());
    parser.parse_bytes(b"</body></message>", &mut events).unwrap();
    assert_eq!(events.len(), 1);
    let message = stanza(&events[0]);
    assert_eq!(message.name(), "message");
    assert_eq!(message.get_tag("body", None), Some("Hi"));
}

#[test]
fn predefined_entity() {
    let events = parse_chunks(&["<a>&amp;</a>"]);
    assert_eq!(events.len(), 1);
    assert_eq!(stanza(&events[0]).value(), Some("&"));
}

#[test]
fn stanza_order() {
    let events = parse_chunks(&["<a><b/></a><c/>"]);
    assert_eq!(events.len(), 2);
    let a = stanza(&events[0]);
    assert_eq!(a.name(), "a");
    assert_eq!(a.children().len(), 1);
    assert_eq!(a.children()[0].name(), "b");
    assert!(a.children()[0].children().is_empty());
    assert_eq!(stanza(&events[1]).name(), "c");
}

#[test]
fn chunking_invariance() {
    let doc = format!(
        "{HEADER}\n  <message to='a@b' type='chat'><body>caf\u{e9} &lt;3 &#x263a;</body>\
         <x xmlns='jabber:x:data'><![CDATA[<raw>]]></x></message>\n\
         <!-- note --><iq type='get' id='p1'><ping xmlns='urn:xmpp:ping'/></iq>\
         </stream:stream>"
    );
    let whole = parse_chunks(&[&doc]);
    assert_eq!(whole.len(), 4);

    let bytes = doc.as_bytes();
    for split in 1..bytes.len() {
        let mut parser = StreamParser::new();
        let mut events = Vec::new();
        parser.parse_bytes(&bytes[..split], &mut events).unwrap();
        parser.parse_bytes(&bytes[split..], &mut events).unwrap();
        assert_eq!(events, whole, "split at {split}");
    }

    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    for byte in bytes.chunks(1) {
        parser.parse_bytes(byte, &mut events).unwrap();
    }
    assert_eq!(events, whole);
}

#[test]
fn namespace_resolution() {
    let events = parse_chunks(&[
        HEADER,
        "<iq type='set' id='b'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
         <resource>home</resource></bind></iq>",
        "<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/></stream:features>",
        "<x:query xmlns:x='jabber:iq:roster'><x:item/><item/></x:query>",
    ]);
    assert_eq!(events.len(), 4);

    let iq = stanza(&events[1]);
    assert_eq!(iq.namespace(), Some(ns::CLIENT));
    let bind = iq.get_child("bind", Some(ns::BIND)).unwrap();
    assert_eq!(bind.get_child("resource", None).unwrap().namespace(), Some(ns::BIND));

    let features = stanza(&events[2]);
    assert!(features.is("features", ns::STREAM));
    assert!(features.has_tag("bind", Some(ns::BIND)));

    let query = stanza(&events[3]);
    assert!(query.is("query", "jabber:iq:roster"));
    assert_eq!(query.children()[0].namespace(), Some("jabber:iq:roster"));
    assert_eq!(query.children()[1].namespace(), Some(ns::CLIENT));
}

#[test]
fn scope_ends_with_element() {
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    let result = parser.parse_bytes(b"<a xmlns:p='urn:p'><p:b/></a><p:c/>", &mut events);
    assert_eq!(
        result,
        Err(StreamError::NotWellFormed(description::UNBOUND_PREFIX))
    );
    assert_eq!(events.len(), 1);
    assert_eq!(stanza(&events[0]).children()[0].namespace(), Some("urn:p"));
}

#[test]
fn registered_default_namespace() {
    let mut parser = StreamParser::new();
    parser
        .builder_mut()
        .register_default_namespace("handshake", "jabber:component:accept");
    let mut events = Vec::new();
    parser.parse_bytes(b"<handshake>abc</handshake><other/>", &mut events).unwrap();
    assert!(stanza(&events[0]).is("handshake", "jabber:component:accept"));
    assert_eq!(stanza(&events[1]).namespace(), None);
}

#[test]
fn whitespace_between_stanzas() {
    let events = parse_chunks(&[HEADER, "\n  <presence/>\r\n\t<presence/>  "]);
    assert_eq!(events.len(), 3);
}

#[test]
fn text_value_coalesced() {
    let events = parse_chunks(&["<body>a<![CDATA[<b>]]>&#65;c</body>"]);
    assert_eq!(stanza(&events[0]).value(), Some("a<b>Ac"));
}

fn parse_error(doc: &str) -> StreamError {
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    parser
        .parse_bytes(doc.as_bytes(), &mut events)
        .expect_err("document must be rejected")
}

#[test]
fn malformed_streams() {
    assert_eq!(
        parse_error("<a><b></a>"),
        StreamError::NotWellFormed(description::TAG_MISMATCH)
    );
    assert_eq!(
        parse_error("</a>"),
        StreamError::NotWellFormed(description::CLOSE_WITHOUT_OPEN)
    );
    assert_eq!(
        parse_error("<a x='1' x='2'/>"),
        StreamError::NotWellFormed(description::DUPLICATE_ATTRIBUTE)
    );
    assert_eq!(
        parse_error("<p:a/>"),
        StreamError::NotWellFormed(description::UNBOUND_PREFIX)
    );
    assert_eq!(
        parse_error("hello<a/>"),
        StreamError::NotWellFormed(description::TEXT_OUTSIDE_STANZA)
    );
    assert!(matches!(
        parse_error("<a>&nbsp;</a>"),
        StreamError::NotWellFormed(_)
    ));
    assert!(matches!(parse_error("<a>\u{1}</a>"), StreamError::InvalidXml(_)));
    assert!(matches!(
        parse_error("<!DOCTYPE a><a/>"),
        StreamError::RestrictedXml(_)
    ));
    assert!(matches!(
        parse_error("<a xmlns:xml='urn:other'/>"),
        StreamError::NotWellFormed(_)
    ));
}

#[test]
fn events_before_error_are_delivered() {
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    let result = parser.parse_bytes(b"<a/><b></c>", &mut events);
    assert!(result.is_err());
    assert_eq!(events.len(), 1);
    assert_eq!(stanza(&events[0]).name(), "a");
}

#[test]
fn stanza_size_limit() {
    let mut parser = StreamParser::with_max_buffer_size(32);
    let mut events = Vec::new();
    parser.parse_bytes(b"<a>short</a>", &mut events).unwrap();
    let result = parser.parse_bytes(
        b"<b xmlns='0123456789012345678901234567890123456789'",
        &mut events,
    );
    assert_eq!(result, Err(StreamError::ResourceConstraint(32)));
}

#[test]
fn reset_restarts_stream() {
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    parser.parse_bytes(HEADER.as_bytes(), &mut events).unwrap();
    assert!(parser.is_stream_open());
    parser.parse_bytes(b"<message><bo", &mut events).unwrap();
    parser.reset();
    assert!(!parser.is_stream_open());
    events.clear();
    parser.parse_bytes(HEADER.as_bytes(), &mut events).unwrap();
    parser.parse_bytes(b"<presence/>", &mut events).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(stanza(&events[1]).name(), "presence");
}

#[test]
fn finish_with_open_elements() {
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    parser.parse_bytes(b"<a><b/>", &mut events).unwrap();
    assert_eq!(
        parser.parse_finish(),
        Err(StreamError::NotWellFormed(description::OPEN_ELEMENTS))
    );
}
