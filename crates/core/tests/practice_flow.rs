use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use repertoire_core::training::PracticeSnapshot;
use repertoire_core::{
    import_pgn, Database, MistakeLedger, MoveAttempt, OpeningStudy, PracticeConfig, PracticeEvent,
    PracticeSession, PracticeState, RepertoireStore, ReviewSession, ShakmatyBoard, Side,
};

const REPERTOIRE: &str = r#"[Event "Queen's Gambit"]

1. d4 d5 2. c4 e6 (2... c6 3. Nf3) (2... dxc4 3. e4) 3. Nc3 *
"#;

fn attempt(uci: &str) -> MoveAttempt {
    MoveAttempt::from_uci(uci).unwrap()
}

fn open_store(dir: &TempDir) -> RepertoireStore<Database> {
    RepertoireStore::new(Database::open(dir.path().join("repertoire.db")).unwrap())
}

/// Plays the user's side of the current line, returning all events.
fn play_current_line(session: &mut PracticeSession) -> Vec<PracticeEvent> {
    let mut events = Vec::new();
    while session.state() == PracticeState::Playing {
        let expected = session.expected_move().unwrap().uci.clone();
        let transition = session.attempt_move(&attempt(&expected));
        events.extend(session.run_to_idle(transition));
    }
    events
}

#[test]
fn test_import_practice_and_resume_from_disk() {
    let dir = TempDir::new().unwrap();
    let study = import_pgn(REPERTOIRE, Side::White).unwrap().remove(0);
    assert_eq!(study.lines().len(), 3);

    {
        let store = open_store(&dir);
        store.save_study(&study).unwrap();

        let progress = store.load_progress(&study.id).unwrap();
        let (mut session, first) =
            PracticeSession::from_study(&study, progress, PracticeConfig::default()).unwrap();
        session.run_to_idle(first);

        let events = play_current_line(&mut session);
        assert!(events.contains(&PracticeEvent::LineComplete { line: 0 }));
        let t = session.next_line().unwrap();
        session.run_to_idle(t);
        store.save_progress(&study.id, session.progress()).unwrap();
    }

    let store = open_store(&dir);
    let loaded = store.load_study(&study.id).unwrap().unwrap();
    assert_eq!(loaded, study);

    let progress = store.load_progress(&study.id).unwrap();
    assert_eq!(progress.current_line_index, 1);
    let (mut session, first) =
        PracticeSession::from_study(&loaded, progress, PracticeConfig::default()).unwrap();
    session.run_to_idle(first);
    assert_eq!(session.line_index(), 1);

    play_current_line(&mut session);
    let t = session.next_line().unwrap();
    session.run_to_idle(t);
    let events = play_current_line(&mut session);
    assert!(events.contains(&PracticeEvent::AllLinesComplete));

    let snapshot: PracticeSnapshot = session.snapshot();
    assert_eq!(snapshot.completion_percent, 100.0);
}

#[test]
fn test_mistakes_feed_review() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let study = import_pgn(REPERTOIRE, Side::White).unwrap().remove(0);
    store.save_study(&study).unwrap();

    let (mut session, first) =
        PracticeSession::from_study(&study, Default::default(), PracticeConfig::default()).unwrap();
    session.run_to_idle(first);

    let mut ledger = MistakeLedger::new();
    let wrong = session.attempt_move(&attempt("e2e4"));
    ledger.observe(&study.id, &wrong.events, Utc::now());
    ledger.save_to(&store, &study.id).unwrap();

    let mut reloaded = MistakeLedger::new();
    reloaded.load_from(&store, &study.id).unwrap();
    let due = reloaded.due_for_review(&study.id, Utc::now());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].expected_uci, "d2d4");

    let (mut review, first) = ReviewSession::<ShakmatyBoard>::new(
        &study,
        &reloaded,
        PracticeConfig::default(),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(review.len(), 1);
    assert!(first.events.contains(&PracticeEvent::LineStarted { line: 0 }));
    review.attempt(&attempt("d2d4"), &mut reloaded, Utc::now());
    assert_eq!(reloaded.get(&study.id, due[0].node_id).unwrap().streak, 1);
    assert!(reloaded.due_for_review(&study.id, Utc::now()).is_empty());

    reloaded.clear_all(&study.id);
    reloaded.save_to(&store, &study.id).unwrap();
    assert!(store.load_mistakes(&study.id).unwrap().is_empty());
}

#[test]
fn test_shuffled_order_is_stable_for_bookkeeping() {
    let study = import_pgn(REPERTOIRE, Side::White).unwrap().remove(0);
    let (mut session, first) =
        PracticeSession::from_study(&study, Default::default(), PracticeConfig::default()).unwrap();
    session.run_to_idle(first);

    let t = session.shuffle(&mut StdRng::seed_from_u64(42));
    session.run_to_idle(t);
    let order = session.order().to_vec();
    assert_eq!(session.line_index(), order[0]);

    let mut completed = Vec::new();
    for _ in 0..order.len() {
        completed.push(session.line_index());
        play_current_line(&mut session);
        if let Some(t) = session.next_line() {
            session.run_to_idle(t);
        }
    }
    assert_eq!(completed, order);
    assert!(session.progress().is_complete(order.len()));
}

#[test]
fn test_editing_invalidates_nothing_else() {
    let mut study = OpeningStudy::new("Scratch", Side::Black, None).unwrap();
    let e4 = study.play_move(&[], &attempt("e2e4")).unwrap();
    let c5 = study.play_move(&e4, &attempt("c7c5")).unwrap();
    let e5 = study.play_move(&e4, &attempt("e7e5")).unwrap();

    let before = study.moves.clone();
    study.promote_to_main_line(e5[1]).unwrap();
    assert!(std::sync::Arc::ptr_eq(
        before.get_shared(e4[0]).unwrap(),
        study.moves.get_shared(e4[0]).unwrap()
    ));
    assert!(!study.moves.get(c5[1]).unwrap().is_main_line);
}
