//! Client-side post editing: checks the session and the form, patches the
//! bound lists optimistically and sends the mutation.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use live_sync::{
    Identity, LiveQueryHub, LiveSyncError, MutationCall, MutationDispatcher, MutationSpec,
    SessionCache,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use url::Url;

use crate::contract::model::{NewPost, Post, PostEdit, PostId};
use crate::functions::{by_author_key, list_key, CREATE_POST, DELETE_POST, UPDATE_POST};

pub const FILL_ALL_FIELDS: &str = "Please fill in all fields";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostsControllerError {
    #[error("Please fill in all fields")]
    IncompleteForm,

    #[error(transparent)]
    Sync(#[from] LiveSyncError),
}

/// Contents of the new/edit post form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub image_url: Option<Url>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, image_url: Option<Url>) -> Self {
        self.image_url = image_url;
        self
    }

    fn check(&self) -> Result<(), PostsControllerError> {
        if self.title.trim().is_empty() || self.body.trim().is_empty() {
            return Err(PostsControllerError::IncompleteForm);
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteArgs<'a> {
    post_id: &'a PostId,
    author_id: &'a str,
}

fn call<A: Serialize>(name: &str, args: &A) -> Result<MutationCall, PostsControllerError> {
    let args = serde_json::to_value(args).map_err(|e| LiveSyncError::decode(e.to_string()))?;
    Ok(MutationCall::new(name, args))
}

/// Create, edit and delete posts on behalf of the signed-in user.
///
/// Each operation checks the session and the form synchronously, applies its
/// optimistic patch to `posts:list` and to the author's `posts:byAuthor`
/// list, and returns a future that resolves with the service's answer. The
/// patch is rolled back if the mutation fails or the future is dropped.
#[derive(Clone)]
pub struct PostsController {
    dispatcher: MutationDispatcher<Vec<Post>>,
    session: Arc<SessionCache>,
}

impl PostsController {
    pub fn new(dispatcher: MutationDispatcher<Vec<Post>>, session: Arc<SessionCache>) -> Self {
        Self {
            dispatcher,
            session,
        }
    }

    pub fn hub(&self) -> &LiveQueryHub<Vec<Post>> {
        self.dispatcher.hub()
    }

    pub fn session(&self) -> &Arc<SessionCache> {
        &self.session
    }

    /// Publish a new post; resolves with the id the service assigned.
    pub fn create_post(
        &self,
        draft: PostDraft,
    ) -> impl Future<Output = Result<PostId, PostsControllerError>> + Send + 'static {
        let submitted = self
            .prepare_create(draft)
            .map(|spec| self.dispatcher.submit_as::<String>(spec));
        async move {
            let id = submitted?.await?;
            debug!(post_id = %id, "Post created");
            Ok::<_, PostsControllerError>(PostId::new(id))
        }
        .instrument(info_span!("blog_posts.controller.create_post"))
    }

    /// Replace title, body and image of one of the user's posts.
    pub fn update_post(
        &self,
        id: PostId,
        draft: PostDraft,
    ) -> impl Future<Output = Result<(), PostsControllerError>> + Send + 'static {
        let span = info_span!("blog_posts.controller.update_post", post_id = %id);
        let submitted = self
            .prepare_update(id, draft)
            .map(|spec| self.dispatcher.submit(spec));
        async move {
            submitted?.await?;
            Ok::<_, PostsControllerError>(())
        }
        .instrument(span)
    }

    /// Delete one of the user's posts.
    pub fn delete_post(
        &self,
        id: PostId,
    ) -> impl Future<Output = Result<(), PostsControllerError>> + Send + 'static {
        let span = info_span!("blog_posts.controller.delete_post", post_id = %id);
        let submitted = self
            .prepare_delete(id)
            .map(|spec| self.dispatcher.submit(spec));
        async move {
            submitted?.await?;
            Ok::<_, PostsControllerError>(())
        }
        .instrument(span)
    }

    fn identity(&self) -> Result<Arc<Identity>, PostsControllerError> {
        Ok(self.session.require_identity()?)
    }

    fn prepare_create(&self, draft: PostDraft) -> Result<MutationSpec<Vec<Post>>, PostsControllerError> {
        let identity = self.identity()?;
        draft.check()?;

        let new_post = NewPost {
            title: draft.title,
            body: draft.body,
            author_id: identity.id.clone(),
            author_name: identity.display_name.clone(),
            image_url: draft.image_url,
        };
        let provisional = Post {
            id: PostId::provisional(),
            title: new_post.title.clone(),
            body: new_post.body.clone(),
            author_id: new_post.author_id.clone(),
            author_name: new_post.author_name.clone(),
            image_ref: new_post.image_url.clone(),
            created_at: Utc::now(),
        };

        Ok(MutationSpec::new(call(CREATE_POST, &new_post)?)
            .affecting(list_key())
            .affecting(by_author_key(&identity.id))
            .with_patch(move |mut list: Vec<Post>| {
                list.insert(0, provisional.clone());
                list
            }))
    }

    fn prepare_update(
        &self,
        id: PostId,
        draft: PostDraft,
    ) -> Result<MutationSpec<Vec<Post>>, PostsControllerError> {
        let identity = self.identity()?;
        draft.check()?;

        let edit = PostEdit {
            post_id: id.clone(),
            title: draft.title,
            body: draft.body,
            image_url: draft.image_url,
            author_id: identity.id.clone(),
        };
        let (title, body, image) = (edit.title.clone(), edit.body.clone(), edit.image_url.clone());

        Ok(MutationSpec::new(call(UPDATE_POST, &edit)?)
            .affecting(list_key())
            .affecting(by_author_key(&identity.id))
            .with_patch(move |list: Vec<Post>| {
                list.into_iter()
                    .map(|post| {
                        if post.id == id {
                            Post {
                                title: title.clone(),
                                body: body.clone(),
                                image_ref: image.clone(),
                                ..post
                            }
                        } else {
                            post
                        }
                    })
                    .collect()
            }))
    }

    fn prepare_delete(&self, id: PostId) -> Result<MutationSpec<Vec<Post>>, PostsControllerError> {
        let identity = self.identity()?;
        let args = DeleteArgs {
            post_id: &id,
            author_id: &identity.id,
        };

        Ok(MutationSpec::new(call(DELETE_POST, &args)?)
            .affecting(list_key())
            .affecting(by_author_key(&identity.id))
            .with_patch(move |mut list: Vec<Post>| {
                list.retain(|post| post.id != id);
                list
            }))
    }
}
