//! Document persistence keyed by `(kind, uuid)`.
//!
//! Bodies are postcard-encoded. The [`DocumentStore`] trait only moves bytes so
//! it stays object safe; [`Documents`] layers typed access on top.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::err::Error;
use crate::io::{document_path, list_io_files, read_io_file, remove_io_file, write_io_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Student,
    Meeting,
    Profile,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Student,
        DocumentKind::Meeting,
        DocumentKind::Profile,
    ];

    pub fn dir(self) -> &'static str {
        match self {
            DocumentKind::Student => "students",
            DocumentKind::Meeting => "meetings",
            DocumentKind::Profile => "profiles",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DocumentKind::Student => "student",
            DocumentKind::Meeting => "meeting",
            DocumentKind::Profile => "profile",
        }
    }
}

pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const KIND: DocumentKind;

    fn id(&self) -> Uuid;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_raw(&self, kind: DocumentKind, id: Uuid) -> Result<Option<Vec<u8>>, Error>;

    async fn save_raw(&self, kind: DocumentKind, id: Uuid, body: Vec<u8>) -> Result<(), Error>;

    /// Returns whether a document was actually removed.
    async fn delete_raw(&self, kind: DocumentKind, id: Uuid) -> Result<bool, Error>;

    async fn list_raw(&self, kind: DocumentKind) -> Result<Vec<Vec<u8>>, Error>;
}

/// Typed access to a [`DocumentStore`].
#[derive(Clone)]
pub struct Documents {
    store: Arc<dyn DocumentStore>,
}

impl Documents {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub async fn find<T: Document>(&self, id: Uuid) -> Result<Option<T>, Error> {
        match self.store.load_raw(T::KIND, id).await? {
            Some(body) => Ok(Some(postcard::from_bytes(&body)?)),
            None => Ok(None),
        }
    }

    pub async fn load<T: Document>(&self, id: Uuid) -> Result<T, Error> {
        self.find(id).await?.ok_or_else(|| {
            Error::not_found(format!("{} with id `{}` does not exist!", T::KIND.name(), id))
        })
    }

    pub async fn save<T: Document>(&self, doc: &T) -> Result<(), Error> {
        let body = postcard::to_allocvec(doc)?;
        self.store.save_raw(T::KIND, doc.id(), body).await
    }

    pub async fn delete<T: Document>(&self, id: Uuid) -> Result<(), Error> {
        if self.store.delete_raw(T::KIND, id).await? {
            Ok(())
        } else {
            Err(Error::not_found(format!(
                "{} with id `{}` does not exist!",
                T::KIND.name(),
                id
            )))
        }
    }

    pub async fn all<T: Document>(&self) -> Result<Vec<T>, Error> {
        self.store
            .list_raw(T::KIND)
            .await?
            .iter()
            .map(|body| postcard::from_bytes(body).map_err(Error::from))
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<(DocumentKind, Uuid), Vec<u8>>>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_raw(&self, kind: DocumentKind, id: Uuid) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.docs.read().await.get(&(kind, id)).cloned())
    }

    async fn save_raw(&self, kind: DocumentKind, id: Uuid, body: Vec<u8>) -> Result<(), Error> {
        self.docs.write().await.insert((kind, id), body);
        Ok(())
    }

    async fn delete_raw(&self, kind: DocumentKind, id: Uuid) -> Result<bool, Error> {
        Ok(self.docs.write().await.remove(&(kind, id)).is_some())
    }

    async fn list_raw(&self, kind: DocumentKind) -> Result<Vec<Vec<u8>>, Error> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, body)| body.clone())
            .collect())
    }
}

/// One `<root>/<kind>/<uuid>.dat` file per document.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        crate::io::prepare_io(&root).await?;
        Ok(Self { root })
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn load_raw(&self, kind: DocumentKind, id: Uuid) -> Result<Option<Vec<u8>>, Error> {
        Ok(read_io_file(&document_path(&self.root, kind, &id)).await?)
    }

    async fn save_raw(&self, kind: DocumentKind, id: Uuid, body: Vec<u8>) -> Result<(), Error> {
        Ok(write_io_file(&document_path(&self.root, kind, &id), &body).await?)
    }

    async fn delete_raw(&self, kind: DocumentKind, id: Uuid) -> Result<bool, Error> {
        Ok(remove_io_file(&document_path(&self.root, kind, &id)).await?)
    }

    async fn list_raw(&self, kind: DocumentKind) -> Result<Vec<Vec<u8>>, Error> {
        let mut bodies = Vec::new();
        for (_, path) in list_io_files(&self.root.join(kind.dir())).await? {
            // a concurrent delete between listing and reading is not an error
            if let Some(body) = read_io_file(&path).await? {
                bodies.push(body);
            }
        }
        Ok(bodies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, Student, StudentDetails};

    fn student() -> Student {
        Student::new(
            Uuid::new_v4(),
            StudentDetails {
                first_name: "Emmy".to_string(),
                last_name: "Noether".to_string(),
                grade: Grade::Nine,
                birth_month: Some(3),
                birth_year: Some(2010),
                consent_form_object_name: None,
            },
        )
    }

    #[tokio::test]
    async fn load_missing_document_is_not_found() {
        let docs = Documents::in_memory();
        let err = docs.load::<Student>(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn memory_store_saves_lists_and_deletes() {
        let docs = Documents::in_memory();
        let a = student();
        let b = student();
        docs.save(&a).await.unwrap();
        docs.save(&b).await.unwrap();

        assert_eq!(docs.load::<Student>(a.id).await.unwrap(), a);
        assert_eq!(docs.all::<Student>().await.unwrap().len(), 2);

        docs.delete::<Student>(a.id).await.unwrap();
        assert!(docs.find::<Student>(a.id).await.unwrap().is_none());
        let err = docs.delete::<Student>(a.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn file_store_overwrites_in_place() {
        let dir = tempfile::TempDir::new().unwrap();
        let docs = Documents::new(Arc::new(FileStore::open(dir.path()).await.unwrap()));

        let mut s = student();
        docs.save(&s).await.unwrap();
        s.verification_status = true;
        docs.save(&s).await.unwrap();

        let loaded = docs.load::<Student>(s.id).await.unwrap();
        assert!(loaded.verification_status);
        assert_eq!(docs.all::<Student>().await.unwrap(), vec![loaded]);
        assert!(dir
            .path()
            .join("students")
            .join(format!("{}.dat", s.id))
            .exists());
    }

    #[tokio::test]
    async fn file_store_reports_corrupt_documents() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();
        store
            .save_raw(DocumentKind::Student, id, vec![0xff, 0xff])
            .await
            .unwrap();

        let docs = Documents::new(Arc::new(store));
        let err = docs.load::<Student>(id).await.unwrap_err();
        assert!(matches!(err, Error::StorageError { .. }));
    }
}
