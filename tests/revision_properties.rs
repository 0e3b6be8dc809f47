//! Property tests for the page revision engine.
//!
//! Each section pins one guarantee the engine gives its callers, running
//! against the in-memory store.

use std::sync::Arc;

use proptest::prelude::*;
use revision_kernel::{
    normalize_tags, natural_cmp, EditPayload, EngineConfig, EngineError, InMemoryPageStore,
    LinkViolation, Mutation, PageLayout, PageReference, PageRevisionEngine, PageStore,
    ParentUpdate, RevisionKind, RevisionOutput, SiteId, TextOptions, UserId, VoteAction,
};

const SITE: SiteId = SiteId::new(1);
const ALICE: UserId = UserId::new(10);
const BOB: UserId = UserId::new(11);

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn new_engine() -> PageRevisionEngine<InMemoryPageStore> {
    PageRevisionEngine::new(Arc::new(InMemoryPageStore::new()), EngineConfig::default())
}

async fn create(engine: &PageRevisionEngine<InMemoryPageStore>, slug: &str, text: &str) {
    engine
        .edit(Mutation::new(SITE, slug).by(ALICE), EditPayload::source(text))
        .await
        .unwrap();
}

fn slug(s: &str) -> PageReference {
    PageReference::from(s)
}

// ─────────────────────────────────────────────────────────────────────────────
// Revision numbering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chained_edits_are_gap_free() {
    let engine = new_engine();
    create(&engine, "start", "v1").await;

    for n in 1..10u32 {
        let output = engine
            .edit(
                Mutation::new(SITE, "start").by(ALICE).expecting(n),
                EditPayload::source(format!("v{}", n + 1)),
            )
            .await
            .unwrap();
        assert_eq!(output.revision_number, n + 1);

        let current = engine
            .get_revision(SITE, &slug("start"), None, TextOptions::default())
            .await
            .unwrap();
        assert_eq!(current.revision.revision_number, n + 1);
    }

    let history = engine.history(SITE, &slug("start"), None, None).await.unwrap();
    let numbers: Vec<u32> = history.iter().map(|r| r.revision_number).collect();
    assert_eq!(numbers, (1..=10).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_history_window() {
    let engine = new_engine();
    create(&engine, "start", "v1").await;
    for n in 1..5u32 {
        engine
            .edit(
                Mutation::new(SITE, "start").by(ALICE).expecting(n),
                EditPayload::source(format!("v{}", n + 1)),
            )
            .await
            .unwrap();
    }

    let window = engine
        .history(SITE, &slug("start"), Some(4), Some(2))
        .await
        .unwrap();
    let numbers: Vec<u32> = window.iter().map(|r| r.revision_number).collect();
    assert_eq!(numbers, vec![4, 3]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_stale_token_has_one_winner() {
    let engine = new_engine();
    create(&engine, "contested", "base").await;

    let mut handles = Vec::new();
    for i in 0..8i64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .edit(
                    Mutation::new(SITE, "contested").by(UserId::new(100 + i)).expecting(1),
                    EditPayload::source(format!("writer {}", i)),
                )
                .await
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(output) => {
                assert_eq!(output.revision_number, 2);
                winners += 1;
            }
            Err(EngineError::ConcurrencyConflict { expected, current, .. }) => {
                assert_eq!(expected, 1);
                assert_eq!(current, 2);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(engine.store().num_revisions(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_has_one_creator() {
    let engine = new_engine();

    let mut handles = Vec::new();
    for i in 0..6i64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .edit(
                    Mutation::new(SITE, "fresh").by(UserId::new(200 + i)).expecting(0),
                    EditPayload::source("first!"),
                )
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(output) => {
                assert!(output.created);
                created += 1;
            }
            Err(error) => assert_eq!(error.code(), "concurrency_conflict"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(engine.store().num_pages(), 1);
}

#[tokio::test]
async fn test_stale_token_leaves_state_untouched() {
    let engine = new_engine();
    create(&engine, "start", "v1").await;
    engine
        .edit(Mutation::new(SITE, "start").by(ALICE).expecting(1), EditPayload::source("v2"))
        .await
        .unwrap();

    let err = engine
        .set_tags(Mutation::new(SITE, "start").by(BOB).expecting(1), ["late"])
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let view = engine
        .get_page(SITE, &slug("start"), TextOptions { wikitext: true, compiled_html: false })
        .await
        .unwrap();
    assert!(view.page.tags.is_empty());
    assert_eq!(view.wikitext.as_deref(), Some("v2"));
    assert_eq!(view.revision.revision_number, 2);
}

#[derive(Debug, Clone, Copy)]
enum StaleMutation {
    Move,
    Delete,
    Restore,
    Rollback,
    Layout,
    Parents,
}

impl StaleMutation {
    const ALL: [StaleMutation; 6] = [
        Self::Move,
        Self::Delete,
        Self::Restore,
        Self::Rollback,
        Self::Layout,
        Self::Parents,
    ];

    async fn run(
        self,
        engine: &PageRevisionEngine<InMemoryPageStore>,
        mutation: Mutation,
    ) -> Result<RevisionOutput, EngineError> {
        match self {
            Self::Move => engine.move_page(mutation, "elsewhere").await,
            Self::Delete => engine.delete(mutation).await,
            Self::Restore => engine.restore(mutation).await,
            Self::Rollback => engine.rollback(mutation, 1).await,
            Self::Layout => engine.set_layout(mutation, Some(PageLayout::Wikidot)).await,
            Self::Parents => {
                let update = ParentUpdate {
                    add: vec![slug("parent")],
                    remove: Vec::new(),
                };
                engine.update_parents(mutation, update).await
            }
        }
    }
}

#[tokio::test]
async fn test_stale_token_rejected_for_every_mutation() {
    for case in StaleMutation::ALL {
        let engine = new_engine();
        create(&engine, "parent", "p").await;
        let created = engine
            .edit(Mutation::new(SITE, "target").by(ALICE), EditPayload::source("v1"))
            .await
            .unwrap();
        let page_id = created.page_id;
        engine
            .edit(Mutation::new(SITE, "target").by(ALICE).expecting(1), EditPayload::source("v2"))
            .await
            .unwrap();

        let mut stale = 1;
        if let StaleMutation::Restore = case {
            engine
                .delete(Mutation::new(SITE, page_id).by(ALICE).expecting(2))
                .await
                .unwrap();
            stale = 2;
        }

        let page_before = engine.store().get_page(page_id).await.unwrap();
        let parents_before = engine.store().get_parents(page_id).await.unwrap();
        let revisions_before = engine.store().num_revisions();

        let err = case
            .run(&engine, Mutation::new(SITE, page_id).by(BOB).expecting(stale))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "concurrency_conflict", "{:?}", case);
        assert!(matches!(
            err,
            EngineError::ConcurrencyConflict { expected, current, .. }
                if expected == stale && current == stale + 1
        ));

        assert_eq!(engine.store().num_revisions(), revisions_before, "{:?}", case);
        assert_eq!(engine.store().get_page(page_id).await.unwrap(), page_before, "{:?}", case);
        assert_eq!(engine.store().get_parents(page_id).await.unwrap(), parents_before, "{:?}", case);
        assert_eq!(
            engine.store().resolve_slug(SITE, "elsewhere").await.unwrap(),
            None,
            "{:?}",
            case
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Slugs
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_move_onto_held_slug_conflicts() {
    let engine = new_engine();
    create(&engine, "alpha", "a").await;
    create(&engine, "beta", "b").await;

    let err = engine
        .move_page(Mutation::new(SITE, "alpha").by(ALICE).expecting(1), "Beta")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlugConflict { ref slug, .. } if slug == "beta"));

    let alpha = engine
        .get_page(SITE, &slug("alpha"), TextOptions::default())
        .await
        .unwrap();
    assert_eq!(alpha.page.slug, "alpha");
    assert_eq!(alpha.revision.revision_number, 1);
}

#[tokio::test]
async fn test_move_keeps_identity() {
    let engine = new_engine();
    create(&engine, "draft", "text").await;
    let before = engine.get_page(SITE, &slug("draft"), TextOptions::default()).await.unwrap();

    let moved = engine
        .move_page(Mutation::new(SITE, "draft").by(ALICE).expecting(1), "final")
        .await
        .unwrap();
    assert_eq!(moved.page_id, before.page.page_id);
    assert_eq!(moved.kind, RevisionKind::Move);
    assert!(!engine.page_exists(SITE, &slug("draft")).await.unwrap());
    assert!(engine.page_exists(SITE, &slug("final")).await.unwrap());

    // The freed slug can be taken by a new page.
    create(&engine, "draft", "again").await;
    assert_eq!(engine.store().num_pages(), 2);
}

#[tokio::test]
async fn test_deleted_page_keeps_slug() {
    let engine = new_engine();
    create(&engine, "gone", "x").await;
    engine
        .delete(Mutation::new(SITE, "gone").by(ALICE).expecting(1))
        .await
        .unwrap();

    let err = engine
        .edit(Mutation::new(SITE, "gone").by(BOB), EditPayload::source("new"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "slug_conflict");

    let deleted = engine.deleted_pages(SITE, "gone").await.unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].deleted_at.is_some());
}

// ─────────────────────────────────────────────────────────────────────────────
// Delete, restore, rollback
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_restore_round_trip() {
    let engine = new_engine();
    create(&engine, "cycle", "body").await;
    let before = engine.get_page(SITE, &slug("cycle"), TextOptions::default()).await.unwrap();
    let first = before.revision.clone();

    engine
        .delete(Mutation::new(SITE, "cycle").by(ALICE).expecting(1))
        .await
        .unwrap();
    let err = engine
        .get_page(SITE, &slug("cycle"), TextOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");

    let restored = engine
        .restore(Mutation::new(SITE, before.page.page_id).by(ALICE).expecting(2))
        .await
        .unwrap();
    assert_eq!(restored.page_id, before.page.page_id);
    assert_eq!(restored.revision_number, 3);

    let after = engine.get_page(SITE, &slug("cycle"), TextOptions::default()).await.unwrap();
    assert!(!after.page.is_deleted());
    assert_eq!(after.revision.content, first.content);

    let original = engine
        .get_revision(SITE, &slug("cycle"), Some(1), TextOptions::default())
        .await
        .unwrap();
    assert_eq!(original.revision, first);
}

#[tokio::test]
async fn test_restore_live_page_rejected() {
    let engine = new_engine();
    create(&engine, "alive", "x").await;
    let err = engine
        .restore(Mutation::new(SITE, "alive").by(ALICE))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_error");
}

#[tokio::test]
async fn test_rollback_appends_copy() {
    let engine = new_engine();
    create(&engine, "doc", "one").await;
    for (n, text) in [(1, "two"), (2, "three"), (3, "four")] {
        engine
            .edit(Mutation::new(SITE, "doc").by(ALICE).expecting(n), EditPayload::source(text))
            .await
            .unwrap();
    }
    let options = TextOptions { wikitext: true, compiled_html: false };
    let target = engine.get_revision(SITE, &slug("doc"), Some(2), options).await.unwrap();
    let third = engine.get_revision(SITE, &slug("doc"), Some(3), options).await.unwrap();

    let output = engine
        .rollback(Mutation::new(SITE, "doc").by(BOB).expecting(4), 2)
        .await
        .unwrap();
    assert_eq!(output.revision_number, 5);
    assert_eq!(output.kind, RevisionKind::Rollback);

    let current = engine.get_revision(SITE, &slug("doc"), None, options).await.unwrap();
    assert_eq!(current.revision.content.wikitext_hash, target.revision.content.wikitext_hash);
    assert_eq!(current.revision.content.title, target.revision.content.title);
    assert_eq!(current.wikitext.as_deref(), Some("two"));
    assert_eq!(current.revision.user_id, Some(BOB));

    let third_again = engine.get_revision(SITE, &slug("doc"), Some(3), options).await.unwrap();
    assert_eq!(third_again, third);
    assert_eq!(engine.history(SITE, &slug("doc"), None, None).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_rollback_to_missing_revision() {
    let engine = new_engine();
    create(&engine, "doc", "one").await;
    let err = engine
        .rollback(Mutation::new(SITE, "doc").by(ALICE).expecting(1), 9)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tags, layout, parents, votes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_tag_normalization_examples() {
    assert_eq!(normalize_tags(["b", "a10", "a2", "a2"]), vec!["a2", "a10", "b"]);
    assert_eq!(normalize_tags(Vec::<String>::new()), Vec::<String>::new());
}

#[tokio::test]
async fn test_tag_update_revision() {
    let engine = new_engine();
    create(&engine, "tagged", "x").await;
    let output = engine
        .set_tags(Mutation::new(SITE, "tagged").by(ALICE).expecting(1), ["scp", "keter", "", "scp"])
        .await
        .unwrap();
    assert_eq!(output.kind, RevisionKind::TagUpdate);

    let view = engine.get_page(SITE, &slug("tagged"), TextOptions::default()).await.unwrap();
    assert_eq!(view.page.tags, vec!["keter", "scp"]);
}

#[tokio::test]
async fn test_layout_update_revision() {
    let engine = new_engine();
    create(&engine, "styled", "x").await;
    let output = engine
        .set_layout(
            Mutation::new(SITE, "styled").by(ALICE).expecting(1),
            Some(PageLayout::Wikijump),
        )
        .await
        .unwrap();
    assert_eq!(output.kind, RevisionKind::LayoutUpdate);

    let view = engine.get_page(SITE, &slug("styled"), TextOptions::default()).await.unwrap();
    assert_eq!(view.page.layout, Some(PageLayout::Wikijump));
}

#[tokio::test]
async fn test_parent_overlap_rejected() {
    let engine = new_engine();
    create(&engine, "child", "c").await;
    create(&engine, "parent", "p").await;

    let err = engine
        .update_parents(
            Mutation::new(SITE, "child").by(ALICE).expecting(1),
            ParentUpdate {
                add: vec![slug("parent")],
                remove: vec![slug("parent")],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidLink { reason: LinkViolation::AddRemoveOverlap, .. }
    ));
    assert!(engine.get_parents(SITE, &slug("child")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_parent_links_both_ways() {
    let engine = new_engine();
    create(&engine, "child", "c").await;
    create(&engine, "parent", "p").await;
    create(&engine, "other", "o").await;

    engine
        .update_parents(
            Mutation::new(SITE, "child").by(ALICE).expecting(1),
            ParentUpdate {
                add: vec![slug("parent"), slug("other")],
                remove: Vec::new(),
            },
        )
        .await
        .unwrap();
    engine
        .update_parents(
            Mutation::new(SITE, "child").by(ALICE).expecting(2),
            ParentUpdate {
                add: Vec::new(),
                remove: vec![slug("other")],
            },
        )
        .await
        .unwrap();

    let parents = engine.get_parents(SITE, &slug("child")).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].slug, "parent");
    let children = engine.get_children(SITE, &slug("parent")).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].slug, "child");
    assert!(engine.get_children(SITE, &slug("other")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_self_and_deleted_parents_rejected() {
    let engine = new_engine();
    create(&engine, "child", "c").await;
    create(&engine, "dead", "d").await;
    engine
        .delete(Mutation::new(SITE, "dead").by(ALICE).expecting(1))
        .await
        .unwrap();

    let err = engine
        .update_parents(
            Mutation::new(SITE, "child").by(ALICE),
            ParentUpdate { add: vec![slug("child")], remove: Vec::new() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidLink { reason: LinkViolation::SelfParent, .. }));

    let err = engine
        .update_parents(
            Mutation::new(SITE, "child").by(ALICE),
            ParentUpdate { add: vec![slug("dead")], remove: Vec::new() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidLink { reason: LinkViolation::DeletedPage, .. }));
}

#[tokio::test]
async fn test_vote_upsert_keeps_latest() {
    let engine = new_engine();
    create(&engine, "rated", "x").await;
    let page = slug("rated");

    engine.vote(SITE, &page, Some(ALICE), VoteAction::Set(1)).await.unwrap();
    let score = engine.vote(SITE, &page, Some(ALICE), VoteAction::Set(-1)).await.unwrap();
    assert_eq!(score.count, 1);
    assert_eq!(score.score, -1);
    assert_eq!(score.downvotes, 1);

    engine.vote(SITE, &page, Some(BOB), VoteAction::Set(1)).await.unwrap();
    let score = engine.vote(SITE, &page, Some(ALICE), VoteAction::Remove).await.unwrap();
    assert_eq!(score.count, 1);
    assert_eq!(score.score, 1);

    // Votes never touch the revision history.
    assert_eq!(engine.history(SITE, &page, None, None).await.unwrap().len(), 1);
    assert_eq!(engine.score(SITE, &page).await.unwrap(), score);
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Step {
    Edit(String),
    Tags(Vec<String>),
    Layout(bool),
    Move(u8),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        "[a-z ]{1,12}".prop_map(Step::Edit),
        prop::collection::vec("[a-z0-9]{0,4}", 0..5).prop_map(Step::Tags),
        any::<bool>().prop_map(Step::Layout),
        (0u8..4).prop_map(Step::Move),
    ]
}

proptest! {
    #[test]
    fn prop_normalized_tags_sorted_unique(raw in prop::collection::vec("[a-c]{0,2}[0-9]{0,3}", 0..20)) {
        let tags = normalize_tags(&raw);
        prop_assert!(tags.iter().all(|t| !t.is_empty()));
        prop_assert!(tags.windows(2).all(|w| natural_cmp(&w[0], &w[1]).is_lt()));
        prop_assert_eq!(normalize_tags(&tags), tags.clone());
        for tag in raw.iter().filter(|t| !t.is_empty()) {
            prop_assert!(tags.contains(tag));
        }
    }

    #[test]
    fn prop_revision_numbers_dense(steps in prop::collection::vec(step(), 1..12)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let engine = new_engine();
            let created = engine
                .edit(Mutation::new(SITE, "page-0").by(ALICE), EditPayload::source("start"))
                .await
                .unwrap();
            let page = PageReference::Id(created.page_id);
            let mut current = 1u32;

            for step in steps {
                let mutation = Mutation::new(SITE, created.page_id).by(ALICE).expecting(current);
                let result = match step {
                    Step::Edit(text) => engine.edit(mutation, EditPayload::source(text)).await,
                    Step::Tags(tags) => engine.set_tags(mutation, tags).await,
                    Step::Layout(on) => {
                        engine.set_layout(mutation, on.then_some(PageLayout::Wikidot)).await
                    }
                    Step::Move(n) => engine.move_page(mutation, &format!("page-{}", n)).await,
                };
                match result {
                    Ok(output) => {
                        current += 1;
                        assert_eq!(output.revision_number, current);
                    }
                    // Moving onto the current slug is refused without a revision.
                    Err(error) => assert_eq!(error.code(), "validation_error"),
                }
            }

            let history = engine.history(SITE, &page, None, None).await.unwrap();
            let numbers: Vec<u32> = history.iter().map(|r| r.revision_number).collect();
            assert_eq!(numbers, (1..=current).rev().collect::<Vec<_>>());
        });
    }
}
