//! Concurrent dispatch into independent inboxes.

use std::sync::Arc;
use std::thread;

use spindle_core::{EventId, Message, ModuleInfo, MsgFlags};
use spindle_messenger::{EventInbox, Messenger};

#[derive(Debug)]
struct Hit {
    event: u64,
    index: u32,
}

#[test]
fn parallel_events_do_not_share_slots() {
    let messenger = Arc::new(Messenger::new());
    let mut subs = messenger.subscriptions(ModuleInfo::new("collector"));
    let hits = subs.bind_multi::<Hit>(MsgFlags::NONE);
    let first = subs.bind_single::<Hit>(MsgFlags::ALLOW_OVERWRITE);
    let sender = Arc::new(ModuleInfo::new("producer"));

    let results: Vec<(u64, Vec<(u64, u32)>)> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8u64)
            .map(|event| {
                let messenger = &messenger;
                let sender = &sender;
                scope.spawn(move || {
                    let mut inbox = EventInbox::new(EventId(event));
                    for index in 0..50 {
                        let message = Arc::new(Message::new(vec![Hit { event, index }]));
                        messenger.dispatch(sender, message, "", &mut inbox).unwrap();
                    }
                    let seen: Vec<(u64, u32)> = inbox
                        .multi(&hits)
                        .iter()
                        .map(|m| (m.data()[0].event, m.data()[0].index))
                        .collect();
                    assert_eq!(inbox.single(&first).unwrap().data()[0].index, 49);
                    messenger.reset_event_state(&mut inbox).unwrap();
                    (event, seen)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .collect()
    });

    for (event, seen) in results {
        let expected: Vec<(u64, u32)> = (0..50).map(|i| (event, i)).collect();
        assert_eq!(seen, expected);
    }
    let stats = messenger.stats();
    assert_eq!(stats.dispatched, 8 * 50);
    assert_eq!(stats.delivered, 8 * 50 * 2);
    assert_eq!(stats.failures, 0);
}

#[test]
fn registration_while_dispatching_keeps_registry_consistent() {
    let messenger = Arc::new(Messenger::new());
    let mut base = messenger.subscriptions(ModuleInfo::new("base"));
    base.bind_multi::<Hit>(MsgFlags::IGNORE_NAME);

    thread::scope(|scope| {
        scope.spawn(|| {
            let sender = ModuleInfo::new("producer");
            let mut inbox = EventInbox::new(EventId(0));
            for index in 0..200 {
                let message = Arc::new(Message::new(vec![Hit { event: 0, index }]));
                messenger.dispatch(&sender, message, "", &mut inbox).unwrap();
                if index % 20 == 0 {
                    inbox.clear();
                }
            }
        });
        scope.spawn(|| {
            for round in 0..50 {
                let mut subs =
                    messenger.subscriptions(ModuleInfo::new(format!("transient{round}")));
                subs.bind_multi_named::<Hit>("other", MsgFlags::NONE);
                subs.register_wildcard_filter(MsgFlags::IGNORE_NAME, |_, name| name == "other");
                subs.release().unwrap();
            }
        });
    });

    assert!(messenger.is_consistent());
    assert_eq!(messenger.delegate_count(), 1);
}
