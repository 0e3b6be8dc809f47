//! End-to-end tests for form-driven page actions.

use std::collections::HashMap;
use std::sync::Arc;

use revision_kernel::{
    dispatch, ActionRequest, ActionResponse, EngineConfig, EngineError, InMemoryPageStore,
    PageAction, PageRevisionEngine, RevisionKind, SiteId, UserId,
};

const SITE: SiteId = SiteId::new(3);
const USER: UserId = UserId::new(42);

struct Harness {
    engine: PageRevisionEngine<InMemoryPageStore>,
}

impl Harness {
    fn new() -> Self {
        Self {
            engine: PageRevisionEngine::new(
                Arc::new(InMemoryPageStore::new()),
                EngineConfig::default(),
            ),
        }
    }

    async fn run(
        &self,
        action: &str,
        slug: &str,
        pairs: &[(&str, &str)],
    ) -> Result<ActionResponse, EngineError> {
        let fields: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let action: PageAction = action.parse()?;
        let request = ActionRequest::from_form(action, SITE, slug, Some(USER), &fields)?;
        dispatch(&self.engine, request).await
    }
}

#[tokio::test]
async fn test_full_page_lifecycle() {
    let h = Harness::new();

    let ActionResponse::Edit(created) = h
        .run("edit", "Main Page", &[("wikitext", "Welcome"), ("title", "Main"), ("tags", "b a10 a2 a2")])
        .await
        .unwrap()
    else {
        panic!("expected edit response");
    };
    assert_eq!(created.slug, "main-page");
    assert!(created.created);

    let ActionResponse::Get(view) = h.run("get", "main-page", &[("wikitext", "true")]).await.unwrap() else {
        panic!("expected get response");
    };
    assert_eq!(view.page.tags, vec!["a2", "a10", "b"]);
    assert_eq!(view.wikitext.as_deref(), Some("Welcome"));
    assert!(view.compiled_html.is_none());

    let ActionResponse::Move(moved) = h
        .run("move", "main-page", &[("new-slug", "home"), ("last-revision-id", "1")])
        .await
        .unwrap()
    else {
        panic!("expected move response");
    };
    assert_eq!(moved.revision_number, 2);
    assert_eq!(moved.kind, RevisionKind::Move);

    let page_id = created.page_id.to_string();
    let ActionResponse::Delete(deleted) = h
        .run("delete", "home", &[("page-id", &page_id), ("last-revision-id", "2")])
        .await
        .unwrap()
    else {
        panic!("expected delete response");
    };
    assert_eq!(deleted.revision_number, 3);

    let ActionResponse::DeletedGet(listed) = h.run("deleted-get", "home", &[]).await.unwrap() else {
        panic!("expected deleted-get response");
    };
    assert_eq!(listed.len(), 1);

    let ActionResponse::Restore(restored) = h
        .run("restore", "home", &[("page-id", &page_id), ("last-revision-id", "3")])
        .await
        .unwrap()
    else {
        panic!("expected restore response");
    };
    assert_eq!(restored.revision_number, 4);

    let ActionResponse::History(history) = h.run("history", "home", &[("limit", "2")]).await.unwrap() else {
        panic!("expected history response");
    };
    let kinds: Vec<RevisionKind> = history.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![RevisionKind::Restore, RevisionKind::Delete]);
}

#[tokio::test]
async fn test_rollback_and_revision_fetch() {
    let h = Harness::new();
    h.run("edit", "doc", &[("wikitext", "first")]).await.unwrap();
    h.run("edit", "doc", &[("wikitext", "second"), ("last-revision-id", "1")])
        .await
        .unwrap();

    h.run("rollback", "doc", &[("revision-number", "1"), ("last-revision-id", "2")])
        .await
        .unwrap();

    let ActionResponse::Revision(view) = h
        .run("revision", "doc", &[("wikitext", "true"), ("compiled-html", "true")])
        .await
        .unwrap()
    else {
        panic!("expected revision response");
    };
    assert_eq!(view.revision.revision_number, 3);
    assert_eq!(view.wikitext.as_deref(), Some("first"));
    assert_eq!(view.compiled_html.as_deref(), Some("<p>first</p>"));
}

#[tokio::test]
async fn test_parents_and_children() {
    let h = Harness::new();
    for slug in ["hub", "spoke-1", "spoke-2"] {
        h.run("edit", slug, &[("wikitext", slug)]).await.unwrap();
    }
    h.run("parent-set", "spoke-1", &[("add-parents", "hub")]).await.unwrap();
    h.run("parent-set", "spoke-2", &[("add-parents", "hub")]).await.unwrap();

    let ActionResponse::ChildrenGet(children) = h.run("children-get", "hub", &[]).await.unwrap() else {
        panic!("expected children-get response");
    };
    let slugs: Vec<&str> = children.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, vec!["spoke-1", "spoke-2"]);

    let err = h
        .run("parent-set", "spoke-1", &[("add-parents", "hub"), ("remove-parents", "hub")])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_link");

    let err = h
        .run("parent-set", "spoke-1", &[("add-parents", "nowhere")])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_link");
}

#[tokio::test]
async fn test_votes_and_score() {
    let h = Harness::new();
    h.run("edit", "rated", &[("wikitext", "x")]).await.unwrap();

    h.run("vote", "rated", &[("action", "set"), ("value", "1")]).await.unwrap();
    let ActionResponse::Vote(score) = h
        .run("vote", "rated", &[("action", "set"), ("value", "-1")])
        .await
        .unwrap()
    else {
        panic!("expected vote response");
    };
    assert_eq!(score.count, 1);
    assert_eq!(score.score, -1);

    let ActionResponse::Score(score) = h.run("score", "rated", &[]).await.unwrap() else {
        panic!("expected score response");
    };
    assert_eq!(score.score, -1);

    let err = h
        .run("vote", "rated", &[("action", "set"), ("value", "lots")])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_error");
}

#[tokio::test]
async fn test_layout_exists_and_rerender() {
    let h = Harness::new();
    h.run("edit", "styled", &[("wikitext", "a < b")]).await.unwrap();

    let ActionResponse::Layout(output) = h
        .run("layout", "styled", &[("layout", "wikidot")])
        .await
        .unwrap()
    else {
        panic!("expected layout response");
    };
    assert_eq!(output.kind, RevisionKind::LayoutUpdate);

    let err = h.run("layout", "styled", &[("layout", "fancy")]).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");

    let ActionResponse::Exists(exists) = h.run("exists", "styled", &[]).await.unwrap() else {
        panic!("expected exists response");
    };
    assert!(exists);

    let ActionResponse::Rerender(output) = h.run("rerender", "styled", &[]).await.unwrap() else {
        panic!("expected rerender response");
    };
    assert_eq!(output.html, "<p>a &lt; b</p>");
    assert_eq!(h.engine.store().num_revisions(), 2);
}

#[tokio::test]
async fn test_malformed_numbers_rejected_before_mutation() {
    let h = Harness::new();
    h.run("edit", "start", &[("wikitext", "x")]).await.unwrap();

    let err = h
        .run("edit", "start", &[("wikitext", "y"), ("last-revision-id", "one")])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::validation("last-revision-id", "expected an integer, got 'one'")
    );
    assert_eq!(h.engine.store().num_revisions(), 1);
}
