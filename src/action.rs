//! Action surface: closed action enum, form parsing and dispatch.
//!
//! Requests arrive as `(site, slug, action)` plus form-encoded fields. Every
//! numeric field is parsed strictly: a present, non-empty value that is not
//! an integer is a validation error. Empty or absent optional fields mean
//! "no value".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::compiler::CompiledOutput;
use crate::engine::{
    EditPayload, Mutation, PageRevisionEngine, PageView, ParentUpdate, RevisionOutput,
    RevisionView, TextOptions,
};
use crate::error::EngineError;
use crate::store::PageStore;
use crate::tags::parse_tag_list;
use crate::types::{
    PageId, PageLayout, PageReference, PageScore, PageSummary, RevisionNumber, RevisionSummary,
    SiteId, UserId, VoteAction,
};

/// Every action a page request can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageAction {
    /// Create a page or append a content revision.
    Edit,
    /// List revisions, newest first.
    History,
    /// Change the page's slug.
    Move,
    /// Fetch one revision.
    Revision,
    /// Restore the content of an earlier revision.
    Rollback,
    /// Set or remove the caller's vote.
    Vote,
    /// Change the page layout.
    Layout,
    /// Replace the tag set.
    Tags,
    /// Add and remove parent links.
    ParentSet,
    /// List parents.
    ParentGet,
    /// List children.
    ChildrenGet,
    /// List deleted pages that held a slug.
    DeletedGet,
    /// Undo a soft delete.
    Restore,
    /// Read the vote aggregate.
    Score,
    /// Soft-delete the page.
    Delete,
    /// Read the page and its latest revision.
    Get,
    /// Whether a live page answers the reference.
    Exists,
    /// Compile the latest wikitext again.
    Rerender,
}

impl PageAction {
    /// All actions, in declaration order.
    pub const ALL: [PageAction; 18] = [
        Self::Edit,
        Self::History,
        Self::Move,
        Self::Revision,
        Self::Rollback,
        Self::Vote,
        Self::Layout,
        Self::Tags,
        Self::ParentSet,
        Self::ParentGet,
        Self::ChildrenGet,
        Self::DeletedGet,
        Self::Restore,
        Self::Score,
        Self::Delete,
        Self::Get,
        Self::Exists,
        Self::Rerender,
    ];

    /// Path segment form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::History => "history",
            Self::Move => "move",
            Self::Revision => "revision",
            Self::Rollback => "rollback",
            Self::Vote => "vote",
            Self::Layout => "layout",
            Self::Tags => "tags",
            Self::ParentSet => "parent-set",
            Self::ParentGet => "parent-get",
            Self::ChildrenGet => "children-get",
            Self::DeletedGet => "deleted-get",
            Self::Restore => "restore",
            Self::Score => "score",
            Self::Delete => "delete",
            Self::Get => "get",
            Self::Exists => "exists",
            Self::Rerender => "rerender",
        }
    }

    /// Whether the action changes state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Edit
                | Self::Move
                | Self::Rollback
                | Self::Vote
                | Self::Layout
                | Self::Tags
                | Self::ParentSet
                | Self::Restore
                | Self::Delete
        )
    }
}

impl FromStr for PageAction {
    type Err = EngineError;

    /// Case-insensitive; surrounding slashes and whitespace are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_matches('/').to_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| EngineError::validation("action", format!("unknown page action '{}'", s)))
    }
}

impl fmt::Display for PageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCommand {
    /// New content and metadata.
    Edit(EditPayload),
    /// History window.
    History {
        /// Newest revision number to include. `None` starts at the latest.
        from: Option<RevisionNumber>,
        /// Most revisions to return.
        limit: Option<usize>,
    },
    /// Slug change.
    Move {
        /// Requested slug, normalized before use.
        new_slug: String,
    },
    /// Single revision fetch.
    Revision {
        /// Revision to fetch. `None` means the latest.
        number: Option<RevisionNumber>,
        /// Which texts to include.
        options: TextOptions,
    },
    /// Content rollback.
    Rollback {
        /// Revision whose content is restored.
        target: RevisionNumber,
    },
    /// Vote change.
    Vote(VoteAction),
    /// New layout. `None` clears it.
    Layout(Option<PageLayout>),
    /// Raw tags, normalized before use.
    Tags(Vec<String>),
    /// Parent link delta.
    ParentSet(ParentUpdate),
    /// List parents.
    ParentGet,
    /// List children.
    ChildrenGet,
    /// List deleted pages at the path slug.
    DeletedGet,
    /// Undo a soft delete.
    Restore,
    /// Read the score.
    Score,
    /// Soft delete.
    Delete,
    /// Page read with the given texts.
    Get(TextOptions),
    /// Existence check.
    Exists,
    /// Fresh compile.
    Rerender,
}

impl PageCommand {
    /// Action this command belongs to.
    pub fn action(&self) -> PageAction {
        match self {
            Self::Edit(_) => PageAction::Edit,
            Self::History { .. } => PageAction::History,
            Self::Move { .. } => PageAction::Move,
            Self::Revision { .. } => PageAction::Revision,
            Self::Rollback { .. } => PageAction::Rollback,
            Self::Vote(_) => PageAction::Vote,
            Self::Layout(_) => PageAction::Layout,
            Self::Tags(_) => PageAction::Tags,
            Self::ParentSet(_) => PageAction::ParentSet,
            Self::ParentGet => PageAction::ParentGet,
            Self::ChildrenGet => PageAction::ChildrenGet,
            Self::DeletedGet => PageAction::DeletedGet,
            Self::Restore => PageAction::Restore,
            Self::Score => PageAction::Score,
            Self::Delete => PageAction::Delete,
            Self::Get(_) => PageAction::Get,
            Self::Exists => PageAction::Exists,
            Self::Rerender => PageAction::Rerender,
        }
    }
}

/// A parsed page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// Site from the request path.
    pub site_id: SiteId,
    /// Target page: the `page-id` field if given, else the path slug.
    pub page: PageReference,
    /// Slug from the request path, kept for slug-scoped queries.
    pub slug: String,
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Concurrency token from `last-revision-id`.
    pub expected_revision: Option<RevisionNumber>,
    /// Revision comments. Empty when absent.
    pub comments: String,
    /// Parsed payload.
    pub command: PageCommand,
}

/// Typed access to form fields.
struct FormFields<'a>(&'a HashMap<String, String>);

impl<'a> FormFields<'a> {
    /// Raw value, `None` when the field is absent.
    fn raw(&self, name: &str) -> Option<&'a str> {
        self.0.get(name).map(String::as_str)
    }

    /// Trimmed value, `None` when absent or blank.
    fn text(&self, name: &str) -> Option<&'a str> {
        self.raw(name).map(str::trim).filter(|value| !value.is_empty())
    }

    fn int<T: FromStr>(&self, name: &str) -> Result<Option<T>, EngineError> {
        match self.text(name) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| {
                EngineError::validation(name, format!("expected an integer, got '{}'", value))
            }),
        }
    }

    fn required_int<T: FromStr>(&self, name: &str) -> Result<T, EngineError> {
        self.int(name)?
            .ok_or_else(|| EngineError::validation(name, "is required"))
    }

    /// Flags are set only by the literal string `"true"`.
    fn flag(&self, name: &str) -> bool {
        self.text(name) == Some("true")
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.raw(name).map(parse_tag_list).unwrap_or_default()
    }

    fn layout(&self) -> Result<Option<PageLayout>, EngineError> {
        match self.text("layout") {
            None => Ok(None),
            Some(value) => PageLayout::from_str(value).map(Some).ok_or_else(|| {
                EngineError::validation("layout", format!("unknown layout '{}'", value))
            }),
        }
    }

    fn text_options(&self) -> TextOptions {
        TextOptions {
            wikitext: self.flag("wikitext"),
            compiled_html: self.flag("compiled-html"),
        }
    }
}

impl ActionRequest {
    /// Parse a request from its path parts and form fields.
    pub fn from_form(
        action: PageAction,
        site_id: SiteId,
        slug: &str,
        user_id: Option<UserId>,
        fields: &HashMap<String, String>,
    ) -> Result<Self, EngineError> {
        let form = FormFields(fields);

        if let Some(form_site) = form.int::<i64>("site-id")? {
            if form_site != site_id.get() {
                return Err(EngineError::validation(
                    "site-id",
                    format!("form site {} does not match path site {}", form_site, site_id),
                ));
            }
        }

        let page = match form.int::<i64>("page-id")? {
            Some(page_id) => PageReference::Id(PageId::new(page_id)),
            None => PageReference::slug(slug),
        };

        let command = match action {
            PageAction::Edit => PageCommand::Edit(EditPayload {
                wikitext: form.raw("wikitext").map(str::to_string),
                title: form.raw("title").map(|title| title.trim().to_string()),
                alt_title: form
                    .raw("alt-title")
                    .map(|_| form.text("alt-title").map(str::to_string)),
                tags: form.raw("tags").map(parse_tag_list),
                layout: match form.raw("layout") {
                    Some(_) => Some(form.layout()?),
                    None => None,
                },
            }),
            PageAction::History => PageCommand::History {
                from: form.int("revision-number")?,
                limit: form.int("limit")?,
            },
            PageAction::Move => PageCommand::Move {
                new_slug: form
                    .text("new-slug")
                    .ok_or_else(|| EngineError::validation("new-slug", "is required"))?
                    .to_string(),
            },
            PageAction::Revision => PageCommand::Revision {
                number: form.int("revision-number")?,
                options: form.text_options(),
            },
            PageAction::Rollback => PageCommand::Rollback {
                target: form.required_int("revision-number")?,
            },
            PageAction::Vote => PageCommand::Vote(match form.text("action") {
                Some("set") => VoteAction::Set(form.required_int("value")?),
                Some("remove") => VoteAction::Remove,
                Some(other) => {
                    return Err(EngineError::validation(
                        "action",
                        format!("unknown vote action '{}'", other),
                    ));
                }
                None => return Err(EngineError::validation("action", "is required")),
            }),
            PageAction::Layout => PageCommand::Layout(form.layout()?),
            PageAction::Tags => PageCommand::Tags(form.list("tags")),
            PageAction::ParentSet => PageCommand::ParentSet(ParentUpdate {
                add: form.list("add-parents").into_iter().map(PageReference::Slug).collect(),
                remove: form.list("remove-parents").into_iter().map(PageReference::Slug).collect(),
            }),
            PageAction::ParentGet => PageCommand::ParentGet,
            PageAction::ChildrenGet => PageCommand::ChildrenGet,
            PageAction::DeletedGet => PageCommand::DeletedGet,
            PageAction::Restore => PageCommand::Restore,
            PageAction::Score => PageCommand::Score,
            PageAction::Delete => PageCommand::Delete,
            PageAction::Get => PageCommand::Get(form.text_options()),
            PageAction::Exists => PageCommand::Exists,
            PageAction::Rerender => PageCommand::Rerender,
        };

        Ok(Self {
            site_id,
            page,
            slug: slug.to_string(),
            user_id,
            expected_revision: form.int("last-revision-id")?,
            comments: form.raw("comments").unwrap_or_default().to_string(),
            command,
        })
    }

    /// Action this request runs.
    pub fn action(&self) -> PageAction {
        self.command.action()
    }

    fn mutation(&self) -> Mutation {
        Mutation {
            site_id: self.site_id,
            page: self.page.clone(),
            user_id: self.user_id,
            expected_revision: self.expected_revision,
            comments: self.comments.clone(),
        }
    }
}

/// Result of a dispatched action, tagged by action name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "result", rename_all = "kebab-case")]
pub enum ActionResponse {
    /// Committed edit.
    Edit(RevisionOutput),
    /// Revision summaries, newest first.
    History(Vec<RevisionSummary>),
    /// Committed move.
    Move(RevisionOutput),
    /// Requested revision.
    Revision(RevisionView),
    /// Committed rollback.
    Rollback(RevisionOutput),
    /// Score after the vote.
    Vote(PageScore),
    /// Committed layout change.
    Layout(RevisionOutput),
    /// Committed tag change.
    Tags(RevisionOutput),
    /// Committed parent change.
    ParentSet(RevisionOutput),
    /// Parent pages.
    ParentGet(Vec<PageSummary>),
    /// Child pages.
    ChildrenGet(Vec<PageSummary>),
    /// Deleted pages that held the slug.
    DeletedGet(Vec<PageSummary>),
    /// Committed restore.
    Restore(RevisionOutput),
    /// Current score.
    Score(PageScore),
    /// Committed delete.
    Delete(RevisionOutput),
    /// Page view.
    Get(PageView),
    /// Whether the page exists.
    Exists(bool),
    /// Compiler output.
    Rerender(CompiledOutput),
}

/// Run a parsed request against the engine.
pub async fn dispatch<S: PageStore>(
    engine: &PageRevisionEngine<S>,
    request: ActionRequest,
) -> Result<ActionResponse, EngineError> {
    let site_id = request.site_id;
    let page = &request.page;
    tracing::debug!(site_id = %site_id, page = %page, action = %request.action(), "Dispatching");

    let response = match &request.command {
        PageCommand::Edit(payload) => {
            ActionResponse::Edit(engine.edit(request.mutation(), payload.clone()).await?)
        }
        PageCommand::History { from, limit } => {
            ActionResponse::History(engine.history(site_id, page, *from, *limit).await?)
        }
        PageCommand::Move { new_slug } => {
            ActionResponse::Move(engine.move_page(request.mutation(), new_slug).await?)
        }
        PageCommand::Revision { number, options } => {
            ActionResponse::Revision(engine.get_revision(site_id, page, *number, *options).await?)
        }
        PageCommand::Rollback { target } => {
            ActionResponse::Rollback(engine.rollback(request.mutation(), *target).await?)
        }
        PageCommand::Vote(action) => {
            ActionResponse::Vote(engine.vote(site_id, page, request.user_id, *action).await?)
        }
        PageCommand::Layout(layout) => {
            ActionResponse::Layout(engine.set_layout(request.mutation(), *layout).await?)
        }
        PageCommand::Tags(tags) => {
            ActionResponse::Tags(engine.set_tags(request.mutation(), tags.clone()).await?)
        }
        PageCommand::ParentSet(update) => {
            ActionResponse::ParentSet(engine.update_parents(request.mutation(), update.clone()).await?)
        }
        PageCommand::ParentGet => ActionResponse::ParentGet(engine.get_parents(site_id, page).await?),
        PageCommand::ChildrenGet => {
            ActionResponse::ChildrenGet(engine.get_children(site_id, page).await?)
        }
        PageCommand::DeletedGet => {
            ActionResponse::DeletedGet(engine.deleted_pages(site_id, &request.slug).await?)
        }
        PageCommand::Restore => ActionResponse::Restore(engine.restore(request.mutation()).await?),
        PageCommand::Score => ActionResponse::Score(engine.score(site_id, page).await?),
        PageCommand::Delete => ActionResponse::Delete(engine.delete(request.mutation()).await?),
        PageCommand::Get(options) => ActionResponse::Get(engine.get_page(site_id, page, *options).await?),
        PageCommand::Exists => ActionResponse::Exists(engine.page_exists(site_id, page).await?),
        PageCommand::Rerender => ActionResponse::Rerender(engine.rerender(site_id, page).await?),
    };

    Ok(response)
}
