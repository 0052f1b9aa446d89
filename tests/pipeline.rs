//! End-to-end tests through the registry and the built-in extensions.

mod harness;

use std::sync::Arc;

use harness::{CollectingIncoming, CollectingOutgoing, Delivered, StaticSession};
use wspipe::{
    Behavior, Callback, Config, Error, ExtensionConfig, ExtensionRegistry, ExtensionResources,
    ExtensionStack, Frame, OpCode, StackState,
};

struct Endpoint {
    stack: ExtensionStack,
    inbound: Delivered,
    outbound: Delivered,
    session: Arc<StaticSession>,
}

fn endpoint(behavior: Behavior, offered: &str, negotiated: &str) -> Endpoint {
    let config = match behavior {
        Behavior::Server => Config::server(),
        Behavior::Client => Config::client(),
    };
    let registry = Arc::new(ExtensionRegistry::with_defaults());
    let mut stack = ExtensionStack::from_config(registry, &config);

    let offered = ExtensionConfig::parse_header(offered).unwrap();
    let negotiated = ExtensionConfig::parse_header(negotiated).unwrap();
    stack
        .negotiate(&ExtensionResources::from_config(&config), &offered, &negotiated)
        .unwrap();

    let inbound = Delivered::new();
    let outbound = Delivered::new();
    let session = StaticSession::new(behavior);
    stack
        .initialize(
            CollectingIncoming::new(inbound.clone()),
            CollectingOutgoing::new(outbound.clone()),
            session.clone(),
        )
        .unwrap();

    Endpoint {
        stack,
        inbound,
        outbound,
        session,
    }
}

#[test]
fn test_negotiated_header_roundtrip() {
    let header = "fragment; maxLength=16, x-unknown; a=1, identity";
    let ep = endpoint(Behavior::Server, header, header);

    assert_eq!(ep.stack.state(), StackState::Active);
    assert_eq!(
        ExtensionConfig::to_header(&ep.stack.negotiated_extensions()),
        "fragment; maxLength=16, identity"
    );
    assert_eq!(ep.stack.outgoing_order(), vec!["fragment", "identity"]);
}

#[test]
fn test_fragment_through_stack() {
    let header = "identity, fragment; maxLength=5";
    let ep = endpoint(Behavior::Client, header, header);

    let (callback, mut done) = Callback::channel();
    ep.stack
        .send_frame(Frame::text("hello, world"), callback, false)
        .unwrap();

    let frames = ep.outbound.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].opcode, OpCode::Text);
    assert!(frames[1..].iter().all(|f| f.opcode == OpCode::Continuation));
    assert!(frames[2].fin);
    assert_eq!(ep.outbound.payload(), b"hello, world");
    assert_eq!(done.try_recv().unwrap(), Ok(()));

    // Inbound frames are not split.
    ep.stack
        .on_frame(Frame::binary(vec![9u8; 12]), Callback::noop())
        .unwrap();
    assert_eq!(ep.inbound.len(), 1);
}

#[test]
fn test_validation_is_internal() {
    let header = "@validation, identity";
    let ep = endpoint(Behavior::Server, header, header);

    assert_eq!(ep.stack.outgoing_order(), vec!["@validation", "identity"]);
    assert_eq!(
        ExtensionConfig::to_header(&ep.stack.negotiated_extensions()),
        "identity"
    );

    let (callback, mut done) = Callback::channel();
    ep.stack
        .on_frame(Frame::new(false, OpCode::Ping, Vec::<u8>::new()), callback)
        .unwrap();
    assert_eq!(done.try_recv().unwrap(), Err(Error::FragmentedControlFrame));
    assert!(ep.inbound.frames().is_empty());
    assert!(ep.session.was_aborted());

    let (callback, mut done) = Callback::channel();
    ep.stack
        .send_frame(Frame::ping(vec![0u8; 200]), callback, false)
        .unwrap();
    assert_eq!(done.try_recv().unwrap(), Err(Error::ControlFrameTooLarge(200)));
    assert!(ep.outbound.frames().is_empty());
}

#[test]
fn test_server_rejects_malformed_offer() {
    let mut stack = ExtensionStack::new(
        Arc::new(ExtensionRegistry::with_defaults()),
        Behavior::Server,
    );
    let offered = ExtensionConfig::parse_header("fragment; maxLength=0").unwrap();

    let err = stack
        .negotiate(&ExtensionResources::default(), &offered, &offered)
        .unwrap_err();

    assert!(matches!(err, Error::MalformedRequest { .. }));
    assert!(err.is_remote_fault());
    assert_eq!(err.http_status(), Some(400));
    assert_eq!(stack.state(), StackState::Empty);
}

#[test]
fn test_client_rejects_unoffered_response() {
    let mut stack = ExtensionStack::new(
        Arc::new(ExtensionRegistry::with_defaults()),
        Behavior::Client,
    );
    let offered = ExtensionConfig::parse_header("fragment; maxLength=10").unwrap();
    let response = ExtensionConfig::parse_header("fragment; maxLength=abc").unwrap();

    let err = stack
        .negotiate(&ExtensionResources::default(), &offered, &response)
        .unwrap_err();

    assert!(matches!(err, Error::MalformedResponse { ref extension, .. } if extension == "fragment; maxLength=abc"));
}

#[test]
fn test_empty_negotiation_passthrough() {
    let ep = endpoint(Behavior::Server, "", "");

    assert!(!ep.stack.has_negotiated_extensions());
    ep.stack
        .send_frame(Frame::binary(vec![1u8, 2, 3]), Callback::noop(), true)
        .unwrap();
    ep.stack.on_frame(Frame::text("x"), Callback::noop()).unwrap();

    assert_eq!(ep.outbound.payload(), vec![1, 2, 3]);
    assert_eq!(ep.inbound.payload(), b"x");
    assert!(ep.stack.to_string().contains("CollectingIncoming"));
}

#[test]
fn test_dump_lists_extensions() {
    let header = "identity; id=A, fragment; maxLength=64";
    let ep = endpoint(Behavior::Server, header, header);
    let dump = ep.stack.dump();

    assert!(dump.starts_with("ExtensionStack[behavior=SERVER,state=Active,size=2]"));
    assert!(dump.contains("identity; id=A"));
    assert!(dump.contains("fragment; maxLength=64"));
}

#[cfg(feature = "compression")]
mod compression {
    use super::*;

    /// Hand every frame the client sent to the server's inbound side.
    fn deliver(from: &Endpoint, to: &Endpoint) {
        for frame in from.outbound.take() {
            to.stack.on_frame(frame, Callback::noop()).unwrap();
        }
    }

    #[test]
    fn test_deflate_fragment_roundtrip() {
        let header = "permessage-deflate; client_max_window_bits, fragment; maxLength=8";
        let client = endpoint(Behavior::Client, header, header);
        let server = endpoint(Behavior::Server, header, header);

        let message = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        client
            .stack
            .send_frame(Frame::text(message.clone()), Callback::noop(), false)
            .unwrap();

        let wire = client.outbound.frames();
        assert!(wire.len() > 1);
        assert!(wire[0].rsv1);
        assert!(wire[1..].iter().all(|f| !f.rsv1));

        deliver(&client, &server);
        assert_eq!(server.inbound.payload(), message.as_bytes());
    }

    #[test]
    fn test_deflate_claims_rsv1_exclusively() {
        let mut registry = ExtensionRegistry::with_defaults();
        registry.register("x-rsv1", |resources, config| {
            Ok(Box::new(wspipe::extensions::deflate::DeflateExtension::from_config(
                resources,
                config.clone(),
            )?))
        });
        let mut stack = ExtensionStack::new(Arc::new(registry), Behavior::Server);
        let negotiated = ExtensionConfig::parse_header("permessage-deflate, x-rsv1, identity")
            .unwrap();

        stack
            .negotiate(&ExtensionResources::default(), &negotiated, &negotiated)
            .unwrap();

        assert_eq!(
            stack.outgoing_order(),
            vec!["permessage-deflate", "identity"]
        );
    }

    #[test]
    fn test_deflate_invalid_offer() {
        let mut stack = ExtensionStack::new(
            Arc::new(ExtensionRegistry::with_defaults()),
            Behavior::Server,
        );
        let offered = ExtensionConfig::parse_header("permessage-deflate; server_max_window_bits=20")
            .unwrap();
        let err = stack
            .negotiate(&ExtensionResources::default(), &offered, &offered)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRequest { .. }));
    }
}
