/// Integration tests: two agents negotiating over the bundled
/// `two_party_negotiation` protocol.
///
/// Pure in-memory: each agent owns a registry, payloads are handed
/// across directly instead of through a transport.
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use parley_protocol::protocols::two_party_negotiation::{self, Conditions, Query};
use parley_protocol::{
    Address, DialogueError, DialogueLabel, DialogueReference, DialogueRegistry, DialogueState,
    EndState, Message, NegotiationAct, ProtocolError, Role, Routing, SpeechAct, Value,
    MAX_MESSAGE_SIZE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn agents() -> (DialogueRegistry, DialogueRegistry) {
    let spec = two_party_negotiation::specification().expect("bundled spec");
    (
        DialogueRegistry::new(spec.clone(), Address::new("buyer-agent")),
        DialogueRegistry::new(spec, Address::new("seller-agent")),
    )
}

fn buyer_addr() -> Address {
    Address::new("buyer-agent")
}

fn seller_addr() -> Address {
    Address::new("seller-agent")
}

fn cfp() -> NegotiationAct {
    NegotiationAct::Cfp {
        query: Query {
            subject: "apples".into(),
            constraints: [("max_price".to_string(), 40)].into_iter().collect(),
        },
    }
}

fn propose() -> NegotiationAct {
    NegotiationAct::Propose {
        price: 35.0,
        items: vec!["apples".into()],
        conditions: Conditions::Text("delivery friday".into()),
    }
}

fn wire(msg: &Message) -> Vec<u8> {
    msg.to_bytes().expect("encode")
}

/// Full happy path: cfp → propose → accept → match_accept.
#[test]
fn successful_negotiation_ends_dialogue() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
    let (buyer, seller) = agents();

    // ── Step 1: buyer opens ─────────────────────────────────────────────
    let msg = buyer
        .send_act(&cfp(), &seller_addr(), None)
        .expect("cfp");
    let buyer_label = DialogueLabel::new(msg.reference().clone(), buyer_addr(), seller_addr());
    let (seller_view, received) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("seller receives cfp");
    assert_eq!(NegotiationAct::from_message(&received).expect("typed"), cfp());
    assert_eq!(seller_view.role(), Role::Responder);
    assert_eq!(seller_view.role_name(), "seller");
    let seller_label = seller_view.label().clone();

    // ── Step 2: seller proposes ─────────────────────────────────────────
    let msg = seller
        .send_act(&propose(), &buyer_addr(), Some(&seller_label))
        .expect("propose");
    let (buyer_view, _) = buyer.on_receive(&wire(&msg), &seller_addr()).expect("buyer receives propose");
    assert_eq!(buyer_view.state(), &DialogueState::InProgress);

    // ── Step 3: buyer accepts ───────────────────────────────────────────
    let msg = buyer
        .send_act(&NegotiationAct::Accept, &seller_addr(), Some(&buyer_label))
        .expect("accept");
    seller.on_receive(&wire(&msg), &buyer_addr()).expect("seller receives accept");

    // ── Step 4: seller confirms ─────────────────────────────────────────
    let msg = seller
        .send_act(&NegotiationAct::MatchAccept, &buyer_addr(), Some(&seller_label))
        .expect("match_accept");
    let (buyer_view, _) = buyer.on_receive(&wire(&msg), &seller_addr()).expect("buyer receives match_accept");

    let successful = EndState::new("successful");
    assert_eq!(buyer_view.outcome(), Some(&successful));
    assert_eq!(buyer_view.messages().len(), 4);
    let seller_view = seller.dialogue(&seller_label).expect("seller dialogue");
    assert!(seller_view.is_ended());

    assert_eq!(buyer.stats().end_state_count(&successful), (1, 0));
    assert_eq!(seller.stats().end_state_count(&successful), (0, 1));
}

/// Both sides end up with mirrored labels sharing one reference.
#[test]
fn labels_mirror_once_established() {
    let (buyer, seller) = agents();
    let (opening_label, msg) = buyer
        .open(cfp().performative(), cfp().to_fields(), &seller_addr())
        .expect("open");
    let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
    let reply = seller
        .send_act(&propose(), &buyer_addr(), Some(seller_view.label()))
        .expect("propose");
    let (buyer_view, _) = buyer.on_receive(&wire(&reply), &seller_addr()).expect("propose");

    let buyer_label = buyer_view.label();
    let seller_label = seller_view.label();
    assert!(buyer_label.is_complete());
    assert_eq!(buyer_label.reference(), seller_label.reference());
    assert_eq!(buyer_label.self_address(), seller_label.opponent());
    assert_eq!(buyer_label.opponent(), seller_label.self_address());
    assert_eq!(
        buyer_label.reference().initiator_half(),
        opening_label.reference().initiator_half()
    );

    // The label handed out at open time keeps working.
    buyer
        .send_act(&NegotiationAct::Accept, &seller_addr(), Some(&opening_label))
        .expect("accept via opening label");
    assert_eq!(buyer.labels(), vec![buyer_label.clone()]);
}

/// `cfp, accept` is not a legal sequence.
#[test]
fn accept_after_cfp_is_illegal() {
    let (buyer, seller) = agents();
    let (label, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");

    let err = buyer
        .send_act(&NegotiationAct::Accept, &seller_addr(), Some(&label))
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Dialogue(DialogueError::IllegalTransition { .. })
    ));
    // Rejection left the dialogue untouched.
    assert_eq!(buyer.dialogue(&label).expect("dialogue").messages().len(), 1);
}

/// `propose` is not an opener, so it cannot start a dialogue from either side.
#[test]
fn propose_cannot_open() {
    let (buyer, seller) = agents();
    let err = seller
        .send_act(&propose(), &buyer_addr(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Dialogue(DialogueError::IllegalTransition { .. })
    ));

    let spec = seller.spec().clone();
    let msg = Message::build(
        &spec,
        "propose",
        propose().to_fields(),
        Routing::opening(DialogueReference::opening("rogue")),
    )
    .expect("build");
    assert!(matches!(
        buyer.on_receive(&wire(&msg), &seller_addr()),
        Err(ProtocolError::Dialogue(DialogueError::IllegalTransition { .. }))
    ));
    assert!(buyer.is_empty());
    assert!(seller.is_empty());
}

/// A reply whose target points at a message that does not exist.
#[test]
fn dangling_target_is_out_of_order() {
    let (buyer, seller) = agents();
    let (_, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");

    let routing = Routing {
        reference: seller_view.label().reference().clone(),
        message_id: 2,
        target: 5,
    };
    let rogue = Message::build(seller.spec(), "propose", propose().to_fields(), routing)
        .expect("build");
    assert!(matches!(
        buyer.on_receive(&wire(&rogue), &seller_addr()),
        Err(ProtocolError::Dialogue(DialogueError::OutOfOrder {
            expected_target: 1,
            target: 5,
            ..
        }))
    ));
    assert_eq!(buyer.stats().messages_rejected(), 1);
}

/// The first reply completes the reference once; a replay is rejected
/// and the reference stays as it was.
#[test]
fn reference_completion_is_idempotent() {
    let (buyer, seller) = agents();
    let (label, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
    let reply = seller
        .send_act(&propose(), &buyer_addr(), Some(seller_view.label()))
        .expect("propose");
    let bytes = wire(&reply);

    let (first, _) = buyer.on_receive(&bytes, &seller_addr()).expect("first reply");
    let completed = first.label().clone();

    assert!(matches!(
        buyer.on_receive(&bytes, &seller_addr()),
        Err(ProtocolError::Dialogue(DialogueError::OutOfOrder { .. }))
    ));
    let after = buyer.dialogue(&label).expect("dialogue");
    assert_eq!(after.label(), &completed);
    assert_eq!(after.messages().len(), 2);
    assert_eq!(buyer.len(), 1);
}

/// A reply carrying a foreign responder half does not hijack the dialogue.
#[test]
fn conflicting_reference_rejected() {
    let (buyer, seller) = agents();
    let (_, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
    let reply = seller
        .send_act(&propose(), &buyer_addr(), Some(seller_view.label()))
        .expect("propose");
    buyer.on_receive(&wire(&reply), &seller_addr()).expect("propose");

    let forged = DialogueReference::new(
        msg.reference().initiator_half(),
        "not-the-seller-half",
    );
    let routing = Routing {
        reference: forged,
        message_id: 3,
        target: 2,
    };
    let decline = NegotiationAct::Decline { reason: None };
    let rogue = Message::build(seller.spec(), "decline", decline.to_fields(), routing)
        .expect("build");
    assert!(matches!(
        buyer.on_receive(&wire(&rogue), &seller_addr()),
        Err(ProtocolError::Dialogue(DialogueError::ReferenceMismatch { .. }))
    ));
}

/// The seller may not send buyer moves, even when the reply graph allows them.
#[test]
fn role_violation_reported() {
    let (buyer, seller) = agents();
    let (label, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
    let reply = seller
        .send_act(&propose(), &buyer_addr(), Some(seller_view.label()))
        .expect("propose");
    buyer.on_receive(&wire(&reply), &seller_addr()).expect("propose");

    // propose -> accept is legal, but only the buyer accepts.
    let err = seller
        .send_act(&NegotiationAct::Accept, &buyer_addr(), Some(seller_view.label()))
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Dialogue(DialogueError::RoleViolation { ref role, .. }) if role == "seller"
    ));
    assert!(buyer.dialogue(&label).is_some());
}

/// Declining ends the dialogue as failed; further moves hit a terminated dialogue.
#[test]
fn decline_ends_as_failed() {
    let (buyer, seller) = agents();
    let (label, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
    let decline = NegotiationAct::Decline {
        reason: Some("out of stock".into()),
    };
    let msg = seller
        .send_act(&decline, &buyer_addr(), Some(seller_view.label()))
        .expect("decline");
    let (buyer_view, received) = buyer.on_receive(&wire(&msg), &seller_addr()).expect("decline");
    assert_eq!(NegotiationAct::from_message(&received).expect("typed"), decline);
    assert_eq!(buyer_view.outcome(), Some(&EndState::new("failed")));

    let err = buyer
        .send_act(&NegotiationAct::Accept, &seller_addr(), Some(&label))
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Dialogue(DialogueError::TerminatedDialogue { .. })
    ));
    assert_eq!(buyer.evict_ended(), 1);
}

/// Schema violations are field errors, not dialogue errors.
#[test]
fn wrong_field_type_rejected_before_dialogue() {
    let (buyer, _) = agents();
    let fields = vec![("query", Value::from("apples"))];
    assert!(matches!(
        buyer.open("cfp", fields, &seller_addr()),
        Err(ProtocolError::Field(_))
    ));
    assert!(buyer.is_empty());
}

/// Many buyers negotiate with one seller at once; dialogues never cross.
#[test]
fn concurrent_dialogues_stay_separate() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
    let spec = two_party_negotiation::specification().expect("bundled spec");
    let seller = Arc::new(DialogueRegistry::new(spec.clone(), seller_addr()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let seller = Arc::clone(&seller);
            let spec = Arc::clone(&spec);
            thread::spawn(move || {
                let me = Address::new(format!("buyer-{i}"));
                let buyer = DialogueRegistry::new(spec, me.clone());
                for round in 0..5 {
                    let (label, msg) = buyer
                        .open("cfp", cfp().to_fields(), &seller_addr())
                        .expect("open");
                    let (view, _) = seller.on_receive(&wire(&msg), &me).expect("cfp");
                    let reply = seller
                        .send_act(&propose(), &me, Some(view.label()))
                        .expect("propose");
                    buyer.on_receive(&wire(&reply), &seller_addr()).expect("propose");
                    let act = if round % 2 == 0 {
                        NegotiationAct::Accept
                    } else {
                        NegotiationAct::Decline { reason: None }
                    };
                    let msg = buyer
                        .send_act(&act, &seller_addr(), Some(&label))
                        .expect("answer");
                    seller.on_receive(&wire(&msg), &me).expect("answer");
                }
                buyer.len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("thread"), 5);
    }

    assert_eq!(seller.len(), 40);
    let labels = seller.labels();
    let references: std::collections::BTreeSet<_> =
        labels.iter().map(|l| l.reference().clone()).collect();
    assert_eq!(references.len(), 40);
    assert_eq!(
        seller.stats().end_state_count(&EndState::new("failed")),
        (0, 16)
    );
    assert_eq!(seller.stats().dialogues_opened(), 40);
}

/// Racing moves on one dialogue: exactly one wins each position, the
/// rest are rejected, and the history stays chained.
#[test]
fn same_dialogue_moves_are_serialized() {
    const RACERS: usize = 8;
    let spec = two_party_negotiation::specification().expect("bundled spec");
    let buyer = Arc::new(DialogueRegistry::new(spec.clone(), buyer_addr()));
    let seller = Arc::new(DialogueRegistry::new(spec, seller_addr()));

    let (buyer_label, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
    let seller_label = seller_view.label().clone();

    let deliver = |registry: &Arc<DialogueRegistry>, from: Address, payload: Vec<u8>| {
        let barrier = Arc::new(Barrier::new(RACERS));
        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                let registry = Arc::clone(registry);
                let barrier = Arc::clone(&barrier);
                let from = from.clone();
                let payload = payload.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry.on_receive(&payload, &from).map(|(_, msg)| msg)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect::<Vec<_>>()
    };
    let assert_one_winner = |results: &[Result<Message, ProtocolError>]| {
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                result,
                Err(ProtocolError::Dialogue(DialogueError::OutOfOrder { .. }))
            ));
        }
    };

    // ── Position 2: one proposal delivered many times at once ───────────
    let proposal = seller
        .send_act(&propose(), &buyer_addr(), Some(&seller_label))
        .expect("propose");
    assert_one_winner(&deliver(&buyer, seller_addr(), wire(&proposal)));

    // ── Position 3: same for the accept ─────────────────────────────────
    let accept = buyer
        .send_act(&NegotiationAct::Accept, &seller_addr(), Some(&buyer_label))
        .expect("accept");
    assert_one_winner(&deliver(&seller, buyer_addr(), wire(&accept)));

    // ── Position 4: local senders race to close the dialogue ────────────
    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let seller = Arc::clone(&seller);
            let barrier = Arc::clone(&barrier);
            let label = seller_label.clone();
            thread::spawn(move || {
                barrier.wait();
                seller.send_act(&NegotiationAct::MatchAccept, &buyer_addr(), Some(&label))
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(ProtocolError::Dialogue(DialogueError::TerminatedDialogue { .. }))
        ));
    }

    let seller_view = seller.dialogue(&seller_label).expect("seller dialogue");
    assert_eq!(seller_view.outcome(), Some(&EndState::new("successful")));
    let positions: Vec<_> = seller_view
        .messages()
        .iter()
        .map(|m| (m.message_id(), m.target()))
        .collect();
    assert_eq!(positions, vec![(1, 0), (2, 1), (3, 2), (4, 3)]);

    let buyer_view = buyer.dialogue(&buyer_label).expect("buyer dialogue");
    assert_eq!(buyer_view.messages().len(), 3);
    assert!(buyer_view.label().is_complete());
}

/// A field value nested far deeper than any declared type is a decode
/// error, not a crash, even while the frame stays under the size limit.
#[test]
fn deeply_nested_value_is_a_decode_error() {
    let (buyer, seller) = agents();
    let (_, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    let bytes = wire(&msg);

    // The body ends with the `query` value; swap it for nested arrays.
    let query_ty = seller
        .spec()
        .speech_act("cfp")
        .and_then(|s| s.field("query"))
        .expect("query field");
    let query = query_ty.encode(msg.get("query").expect("query")).expect("encode");
    assert!(bytes.ends_with(&query));
    let mut payload = bytes[..bytes.len() - query.len()].to_vec();
    payload.extend(std::iter::repeat(0x91).take(200_000));
    payload.push(0x01);
    assert!(payload.len() < MAX_MESSAGE_SIZE);

    assert!(matches!(
        seller.on_receive(&payload, &buyer_addr()),
        Err(ProtocolError::Decode(_))
    ));
    assert!(seller.is_empty());
    assert_eq!(seller.stats().decode_failures(), 1);
}

/// Stats snapshots serialize for export.
#[test]
fn stats_snapshot_counts_traffic() {
    let (buyer, seller) = agents();
    let (_, msg) = buyer
        .open("cfp", cfp().to_fields(), &seller_addr())
        .expect("open");
    seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
    let _ = seller.on_receive(&[0x92, 0x01], &buyer_addr());

    let snap = seller.stats().snapshot();
    assert_eq!(snap.dialogues_opened, 1);
    assert_eq!(snap.messages_accepted, 1);
    assert_eq!(snap.decode_failures, 1);
    let counts: BTreeMap<_, _> = snap.other_initiated.clone();
    assert_eq!(counts.get("successful"), Some(&0));
}

fn act_for(performative: &str) -> NegotiationAct {
    match performative {
        "cfp" => cfp(),
        "propose" => propose(),
        "accept" => NegotiationAct::Accept,
        "decline" => NegotiationAct::Decline { reason: None },
        "match_accept" => NegotiationAct::MatchAccept,
        other => panic!("unexpected performative {other}"),
    }
}

/// Seeded random walks over the reply table always stay legal and end
/// with both sides agreeing on the outcome.
#[test]
fn random_legal_walks_agree_on_outcome() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..50 {
        let (buyer, seller) = agents();
        let spec = buyer.spec().clone();
        let (buyer_label, msg) = buyer
            .open("cfp", cfp().to_fields(), &seller_addr())
            .expect("open");
        let (seller_view, _) = seller.on_receive(&wire(&msg), &buyer_addr()).expect("cfp");
        let seller_label = seller_view.label().clone();

        let mut last = "cfp".to_string();
        let mut speaker = Role::Responder;
        let mut moves = 1;
        loop {
            let candidates: Vec<&String> = spec
                .replies(&last)
                .unwrap_or(&[])
                .iter()
                .filter(|p| spec.may_send(speaker, p))
                .collect();
            if candidates.is_empty() {
                break;
            }
            let next = candidates[rng.random_range(0..candidates.len())].clone();
            let act = act_for(&next);
            match speaker {
                Role::Initiator => {
                    let msg = buyer
                        .send_act(&act, &seller_addr(), Some(&buyer_label))
                        .expect("buyer move");
                    seller.on_receive(&wire(&msg), &buyer_addr()).expect("seller receives");
                }
                Role::Responder => {
                    let msg = seller
                        .send_act(&act, &buyer_addr(), Some(&seller_label))
                        .expect("seller move");
                    buyer.on_receive(&wire(&msg), &seller_addr()).expect("buyer receives");
                }
            }
            moves += 1;
            last = next;
            speaker = speaker.counterpart();
        }

        assert!(spec.is_terminal(&last));
        let buyer_view = buyer.dialogue(&buyer_label).expect("buyer dialogue");
        let seller_view = seller.dialogue(&seller_label).expect("seller dialogue");
        assert!(buyer_view.is_ended());
        assert!(seller_view.is_ended());
        assert_eq!(buyer_view.outcome(), spec.outcome(&last));
        assert_eq!(buyer_view.outcome(), seller_view.outcome());
        assert_eq!(buyer_view.messages().len(), moves);
    }
}
