//! Fuzz target for PushEvent decoding
//!
//! Realtime payloads come from the socket as an event name, a channel name
//! and a JSON data string, none of which the client controls.
//!
//! # Invariants
//!
//! - Decoding NEVER panics; invalid input returns an error or `None`
//! - Events accepted by `decode_on` are also accepted by `decode`
//! - Accepted events re-encode and decode to the same event

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use threadline_proto::{Channel, PushEvent};

#[derive(Debug, Arbitrary)]
struct Input {
    channel: ChannelChoice,
    event: EventChoice,
    data: Vec<u8>,
}

#[derive(Debug, Arbitrary)]
enum ChannelChoice {
    Private(u64),
    Presence,
    Raw(String),
}

#[derive(Debug, Arbitrary)]
enum EventChoice {
    MessageSent,
    Namespaced,
    UserOnline,
    UserOffline,
    Raw(String),
}

fuzz_target!(|input: Input| {
    let channel = match input.channel {
        ChannelChoice::Private(user_id) => Channel::Private { user_id }.name(),
        ChannelChoice::Presence => Channel::Presence.name(),
        ChannelChoice::Raw(name) => name,
    };
    let event = match input.event {
        EventChoice::MessageSent => ".MessageSent".to_owned(),
        EventChoice::Namespaced => "App\\Events\\MessageSent".to_owned(),
        EventChoice::UserOnline => "UserOnline".to_owned(),
        EventChoice::UserOffline => ".UserOffline".to_owned(),
        EventChoice::Raw(name) => name,
    };

    let _ = Channel::parse(&channel);
    let plain = PushEvent::decode(&event, &input.data);

    if let Ok(Some(scoped)) = PushEvent::decode_on(&channel, &event, &input.data) {
        assert!(matches!(plain, Ok(Some(_))), "decode_on accepted what decode rejected");

        let data = scoped.encode_data().expect("decoded event must re-encode");
        let again = PushEvent::decode(scoped.name(), &data).expect("re-encoded event must decode");
        assert_eq!(again, Some(scoped));
    }
});
