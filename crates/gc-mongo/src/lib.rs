//! MongoDB adapter (implements the `gc-core` ConfigStore port).
//!
//! One document per chat in the `chat_configs` collection, `_id` = chat id.
//! Partial updates become single `$set` documents so concurrent writes on
//! disjoint fields compose at the server.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use mongodb::{
    bson::{doc, to_bson, Bson, Document},
    options::ReturnDocument,
    Client, Collection,
};

use gc_core::{
    domain::ChatId,
    errors::Error,
    model::ChatConfig,
    store::{ConfigPatch, ConfigStore},
    Result,
};

const COLLECTION: &str = "chat_configs";

#[derive(Clone)]
pub struct MongoStore {
    configs: Collection<ChatConfig>,
}

impl MongoStore {
    /// Connects and pings the deployment so startup fails fast on a bad URI.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await.map_err(map_err)?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }).await.map_err(map_err)?;

        tracing::info!(db = db_name, "connected to mongodb");
        Ok(Self {
            configs: db.collection(COLLECTION),
        })
    }
}

fn map_err(e: mongodb::error::Error) -> Error {
    Error::Store(format!("mongodb: {e}"))
}

fn map_bson_err(e: mongodb::bson::ser::Error) -> Error {
    Error::Store(format!("bson: {e}"))
}

/// `Some` patch fields become `$set` entries; `None` fields are untouched.
fn set_document(patch: &ConfigPatch) -> Result<Document> {
    let mut set = Document::new();
    if let Some(v) = patch.anti_link {
        set.insert("anti_link", v);
    }
    if let Some(v) = patch.anti_mention {
        set.insert("anti_mention", v);
    }
    if let Some(words) = &patch.banned_words {
        set.insert("banned_words", to_bson(words).map_err(map_bson_err)?);
    }
    if let Some(specs) = &patch.recurring_broadcasts {
        set.insert(
            "recurring_broadcasts",
            to_bson(specs).map_err(map_bson_err)?,
        );
    }
    Ok(set)
}

fn broadcasts_filter() -> Document {
    // Non-empty array test: element 0 exists.
    doc! { "recurring_broadcasts.0": { "$exists": true } }
}

#[async_trait]
impl ConfigStore for MongoStore {
    async fn get_or_create(&self, chat_id: ChatId) -> Result<ChatConfig> {
        let defaults = doc! {
            "anti_link": true,
            "anti_mention": true,
            "banned_words": Bson::Array(Vec::new()),
            "recurring_broadcasts": Bson::Array(Vec::new()),
        };

        let found = self
            .configs
            .find_one_and_update(
                doc! { "_id": chat_id.0 },
                doc! { "$setOnInsert": defaults },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(map_err)?;

        found.ok_or_else(|| {
            Error::Store(format!("upsert returned no document for chat {}", chat_id.0))
        })
    }

    async fn update(&self, chat_id: ChatId, patch: ConfigPatch) -> Result<()> {
        let set = set_document(&patch)?;
        if set.is_empty() {
            return Ok(());
        }

        self.configs
            .update_one(doc! { "_id": chat_id.0 }, doc! { "$set": set })
            .upsert(true)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn with_broadcasts(&self) -> Result<BoxStream<'static, Result<ChatConfig>>> {
        let cursor = self
            .configs
            .find(broadcasts_filter())
            .await
            .map_err(map_err)?;

        Ok(cursor.map_err(map_err).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_core::model::{BroadcastSpec, ContentKind};

    #[test]
    fn set_document_maps_only_present_fields() {
        let patch = ConfigPatch {
            anti_link: Some(false),
            banned_words: Some(vec!["spam".to_string()]),
            ..Default::default()
        };

        let set = set_document(&patch).unwrap();
        assert!(!set.get_bool("anti_link").unwrap());
        assert!(set.get_array("banned_words").is_ok());
        assert!(!set.contains_key("anti_mention"));
        assert!(!set.contains_key("recurring_broadcasts"));
    }

    #[test]
    fn empty_patch_produces_empty_set_document() {
        assert!(set_document(&ConfigPatch::default()).unwrap().is_empty());
    }

    #[test]
    fn broadcast_specs_serialize_with_wire_field_names() {
        let patch = ConfigPatch {
            recurring_broadcasts: Some(vec![BroadcastSpec {
                kind: ContentKind::Video,
                text: "promo".to_string(),
                file_ref: Some("BAAC9".to_string()),
                buttons: Vec::new(),
                interval_seconds: 600,
                last_sent: 0,
            }]),
            ..Default::default()
        };

        let set = set_document(&patch).unwrap();
        let arr = set.get_array("recurring_broadcasts").unwrap();
        let Bson::Document(first) = &arr[0] else {
            panic!("expected document");
        };
        assert_eq!(first.get_str("type").unwrap(), "video");
        assert_eq!(first.get_str("file_ref").unwrap(), "BAAC9");
        assert_eq!(first.get_i64("interval_seconds").unwrap(), 600);
    }
}
