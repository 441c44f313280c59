//! Curated story lists with optional collaborators.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::application::access::load_story;
use crate::application::auth::Principal;
use crate::application::error::ServiceError;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{
    CollectionStoryItem, CollectionsRepo, CreateCollectionParams, StoriesRepo,
    UpdateCollectionParams, UsersRepo,
};
use crate::domain::entities::CollectionRecord;
use crate::domain::validation::{normalize_optional, normalize_title};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Clone)]
pub struct CollectionService {
    pub(crate) collections: Arc<dyn CollectionsRepo>,
    pub(crate) stories: Arc<dyn StoriesRepo>,
    pub(crate) users: Arc<dyn UsersRepo>,
}

impl CollectionService {
    pub fn new(
        collections: Arc<dyn CollectionsRepo>,
        stories: Arc<dyn StoriesRepo>,
        users: Arc<dyn UsersRepo>,
    ) -> Self {
        Self {
            collections,
            stories,
            users,
        }
    }

    pub async fn create_collection(
        &self,
        principal: &Principal,
        input: CollectionInput,
    ) -> Result<CollectionRecord, ServiceError> {
        let name = normalize_title("name", &input.name)?;
        Ok(self
            .collections
            .create_collection(CreateCollectionParams {
                owner_id: principal.id,
                name,
                description: normalize_optional(input.description),
                is_public: input.is_public,
            })
            .await?)
    }

    /// Public collections are open; private ones need the owner or a collaborator.
    pub async fn get_collection(
        &self,
        viewer: Option<Uuid>,
        collection_id: Uuid,
    ) -> Result<CollectionRecord, ServiceError> {
        let collection = self.load(collection_id).await?;
        if collection.is_public || self.can_edit(&collection, viewer).await? {
            Ok(collection)
        } else {
            Err(ServiceError::Forbidden("collection is private"))
        }
    }

    pub async fn update_collection(
        &self,
        principal: &Principal,
        collection_id: Uuid,
        input: CollectionInput,
    ) -> Result<CollectionRecord, ServiceError> {
        self.load_owned(principal, collection_id).await?;
        let name = normalize_title("name", &input.name)?;
        self.collections
            .update_collection(UpdateCollectionParams {
                id: collection_id,
                name,
                description: normalize_optional(input.description),
                is_public: input.is_public,
            })
            .await
            .map_err(ServiceError::not_found_on_missing("collection"))
    }

    pub async fn delete_collection(
        &self,
        principal: &Principal,
        collection_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.load_owned(principal, collection_id).await?;
        if self.collections.delete_collection(collection_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("collection"))
        }
    }

    pub async fn list_my_collections(
        &self,
        principal: &Principal,
    ) -> Result<Vec<CollectionRecord>, ServiceError> {
        Ok(self.collections.list_for_owner(principal.id).await?)
    }

    pub async fn discover_collections(
        &self,
        page: PageRequest,
    ) -> Result<Paginated<CollectionRecord>, ServiceError> {
        Ok(self.collections.list_public(page).await?)
    }

    /// Adding a story twice is not an error. Returns whether it was newly added.
    pub async fn add_story(
        &self,
        principal: &Principal,
        collection_id: Uuid,
        story_id: Uuid,
    ) -> Result<bool, ServiceError> {
        self.load_editable(principal, collection_id).await?;
        let story = load_story(self.stories.as_ref(), story_id).await?;
        if !story.visible_to(Some(principal.id)) {
            return Err(ServiceError::NotFound("story"));
        }
        Ok(self.collections.add_story(collection_id, story_id).await?)
    }

    pub async fn remove_story(
        &self,
        principal: &Principal,
        collection_id: Uuid,
        story_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.load_editable(principal, collection_id).await?;
        if self.collections.remove_story(collection_id, story_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("collection story"))
        }
    }

    pub async fn add_collaborator(
        &self,
        principal: &Principal,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.load_owned(principal, collection_id).await?;
        if user_id == principal.id {
            return Err(ServiceError::bad_request("the owner is already a collaborator"));
        }
        self.users
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        if self.collections.add_collaborator(collection_id, user_id).await? {
            Ok(())
        } else {
            Err(ServiceError::Conflict("user already collaborates"))
        }
    }

    pub async fn remove_collaborator(
        &self,
        principal: &Principal,
        collection_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.load_owned(principal, collection_id).await?;
        if self
            .collections
            .remove_collaborator(collection_id, user_id)
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::NotFound("collaborator"))
        }
    }

    /// Stories in collection order. Private stories are hidden from everyone but their author.
    pub async fn collection_stories(
        &self,
        viewer: Option<Uuid>,
        collection_id: Uuid,
    ) -> Result<Vec<CollectionStoryItem>, ServiceError> {
        self.get_collection(viewer, collection_id).await?;
        let mut items = self.collections.list_stories(collection_id).await?;
        items.retain(|item| !item.is_private || viewer == Some(item.author_id));
        items.sort_by_key(|item| item.order);
        Ok(items)
    }

    async fn load(&self, collection_id: Uuid) -> Result<CollectionRecord, ServiceError> {
        self.collections
            .find_collection(collection_id)
            .await?
            .ok_or(ServiceError::NotFound("collection"))
    }

    async fn load_owned(
        &self,
        principal: &Principal,
        collection_id: Uuid,
    ) -> Result<CollectionRecord, ServiceError> {
        let collection = self.load(collection_id).await?;
        if collection.owner_id != principal.id {
            return Err(ServiceError::Forbidden("only the owner may manage this collection"));
        }
        Ok(collection)
    }

    async fn load_editable(
        &self,
        principal: &Principal,
        collection_id: Uuid,
    ) -> Result<CollectionRecord, ServiceError> {
        let collection = self.load(collection_id).await?;
        if !self.can_edit(&collection, Some(principal.id)).await? {
            return Err(ServiceError::Forbidden("not a collaborator"));
        }
        Ok(collection)
    }

    async fn can_edit(
        &self,
        collection: &CollectionRecord,
        viewer: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        let Some(user_id) = viewer else {
            return Ok(false);
        };
        if collection.owner_id == user_id {
            return Ok(true);
        }
        Ok(self
            .collections
            .is_collaborator(collection.id, user_id)
            .await?)
    }
}
