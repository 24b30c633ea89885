//! Remote store collaborator
//!
//! The import pipeline talks to the remote gateway through these traits and
//! treats every failure from this boundary as an opaque error to propagate.
//! Pixel handles are stateful: one handle is bound to one pixel set, and
//! reads/writes on the same set must not interleave across handles.
//!
//! [`InMemoryStore`] is the test double: entity table, uploads, pixel sets
//! as plane maps, scripted failure injection and call recording.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use vitrea_common::events::ImportSize;
use vitrea_common::{Entity, EntityId, EntityKind, Error, Result};

/// Result of the server-side parse of an uploaded file
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Staging pixel set holding the parsed planes
    pub pixels: EntityId,
    pub size: ImportSize,
    pub series_count: usize,
}

/// A newly created remote image with its pixel set
#[derive(Debug, Clone)]
pub struct CreatedImage {
    pub image: Entity,
    pub pixels: EntityId,
}

/// Sequential read handle bound to one pixel set
pub trait PixelReader: Send {
    fn dimensions(&self) -> ImportSize;
    fn read_plane(&mut self, z: i32, c: i32, t: i32) -> Result<Vec<u8>>;
    fn close(&mut self) -> Result<()>;
}

/// Sequential write handle bound to one pixel set.
///
/// Nothing is committed until [`save`](PixelWriter::save); a handle closed
/// without saving leaves the destination logically incomplete.
pub trait PixelWriter: Send {
    fn dimensions(&self) -> ImportSize;
    fn write_plane(&mut self, bytes: &[u8], z: i32, c: i32, t: i32) -> Result<()>;
    fn save(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Remote gateway surface consumed by the import pipeline
pub trait RemoteStore: Send + Sync {
    fn get(&self, kind: EntityKind, id: EntityId) -> Result<Entity>;
    fn create(&self, entity: Entity) -> Result<Entity>;
    fn update(&self, entity: Entity) -> Result<Entity>;
    fn delete(&self, entity: &Entity) -> Result<()>;

    /// Remote hierarchy fetch for lazy child population
    fn load_children(&self, parent: EntityId) -> Result<Vec<Entity>>;

    /// Append one chunk of a file upload
    fn upload_chunk(&self, filename: &str, offset: u64, chunk: &[u8]) -> Result<()>;

    /// Finish an upload; the server parses it into a staging pixel set.
    fn finalize_upload(&self, filename: &str) -> Result<StagedFile>;

    /// Create a new image entity with a pixel set of the given dimensions
    fn create_image(&self, name: &str, size: ImportSize) -> Result<CreatedImage>;

    /// Link a child entity into a container (e.g. image into dataset)
    fn link(&self, parent: EntityId, child: EntityId) -> Result<()>;

    fn open_pixel_reader(&self, pixels: EntityId) -> Result<Box<dyn PixelReader>>;
    fn open_pixel_writer(&self, pixels: EntityId) -> Result<Box<dyn PixelWriter>>;

    /// Archive the original upload server-side
    fn archive_original(&self, filename: &str, pixels: EntityId) -> Result<()>;

    /// Request server-side thumbnail generation
    fn create_thumbnail(&self, pixels: EntityId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory test double
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PixelSet {
    size: ImportSize,
    planes: HashMap<usize, Vec<u8>>,
    /// Planes written but not yet committed by save()
    pending: HashMap<usize, Vec<u8>>,
    save_count: usize,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    entities: HashMap<EntityId, Entity>,
    links: HashMap<EntityId, Vec<EntityId>>,
    uploads: HashMap<String, Vec<u8>>,
    pixel_sets: HashMap<EntityId, PixelSet>,
    archived: Vec<String>,
    thumbnails: Vec<EntityId>,
    reader_closes: usize,
    writer_closes: usize,
    // Failure injection
    fail_upload_of: Option<String>,
    fail_write_on_plane: Option<usize>,
    fail_on_save: bool,
}

impl Inner {
    fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }
}

/// In-memory [`RemoteStore`] implementation for tests.
///
/// The "parse" of an uploaded file slices its bytes into planes of
/// `size_x * size_y`, padded with zeros, keyed by linear plane index.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
    /// Dimensions the staging parse reports for every upload
    stage_size: ImportSize,
}

impl InMemoryStore {
    pub fn new(stage_size: ImportSize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            stage_size,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }

    /// Seed an entity with a fresh id; returns the persisted copy.
    pub fn seed(&self, mut entity: Entity) -> Entity {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        entity
            .mark_persisted(id)
            .expect("seeding an already-persisted entity");
        inner.entities.insert(id, entity.clone());
        entity
    }

    /// Seed a pixel set with explicit planes keyed by linear index
    pub fn seed_pixels(&self, size: ImportSize, planes: HashMap<usize, Vec<u8>>) -> EntityId {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        inner.pixel_sets.insert(
            id,
            PixelSet {
                size,
                planes,
                pending: HashMap::new(),
                save_count: 0,
            },
        );
        id
    }

    pub fn fail_upload_of(&self, filename: &str) {
        self.lock().fail_upload_of = Some(filename.to_string());
    }

    /// Inject a write failure on the plane with the given linear index
    pub fn fail_write_on_plane(&self, linear_index: usize) {
        self.lock().fail_write_on_plane = Some(linear_index);
    }

    pub fn fail_on_save(&self) {
        self.lock().fail_on_save = true;
    }

    pub fn save_count(&self, pixels: EntityId) -> usize {
        self.lock()
            .pixel_sets
            .get(&pixels)
            .map(|p| p.save_count)
            .unwrap_or(0)
    }

    pub fn reader_closes(&self) -> usize {
        self.lock().reader_closes
    }

    pub fn writer_closes(&self) -> usize {
        self.lock().writer_closes
    }

    /// Committed planes of a pixel set, keyed by linear index
    pub fn committed_planes(&self, pixels: EntityId) -> HashMap<usize, Vec<u8>> {
        self.lock()
            .pixel_sets
            .get(&pixels)
            .map(|p| p.planes.clone())
            .unwrap_or_default()
    }

    pub fn linked_children(&self, parent: EntityId) -> Vec<EntityId> {
        self.lock().links.get(&parent).cloned().unwrap_or_default()
    }

    pub fn archived(&self) -> Vec<String> {
        self.lock().archived.clone()
    }

    pub fn thumbnails(&self) -> Vec<EntityId> {
        self.lock().thumbnails.clone()
    }

    fn plane_count(size: ImportSize) -> usize {
        (size.size_z * size.size_c * size.size_t) as usize
    }
}

impl RemoteStore for InMemoryStore {
    fn get(&self, kind: EntityKind, id: EntityId) -> Result<Entity> {
        let inner = self.lock();
        let entity = inner
            .entities
            .get(&id)
            .ok_or_else(|| Error::Remote(format!("{} {} not found", kind, id)))?;
        Ok(entity.clone())
    }

    fn create(&self, mut entity: Entity) -> Result<Entity> {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        entity
            .mark_persisted(id)
            .map_err(|e| Error::Remote(e.to_string()))?;
        inner.entities.insert(id, entity.clone());
        Ok(entity)
    }

    fn update(&self, mut entity: Entity) -> Result<Entity> {
        let mut inner = self.lock();
        let id = entity
            .id()
            .ok_or_else(|| Error::Remote("update of unsaved entity".to_string()))?;
        if !inner.entities.contains_key(&id) {
            return Err(Error::Remote(format!("entity {} not found", id)));
        }
        entity
            .mark_persisted(id)
            .map_err(|e| Error::Remote(e.to_string()))?;
        inner.entities.insert(id, entity.clone());
        Ok(entity)
    }

    fn delete(&self, entity: &Entity) -> Result<()> {
        let mut inner = self.lock();
        let id = entity
            .id()
            .ok_or_else(|| Error::Remote("delete of unsaved entity".to_string()))?;
        inner.entities.remove(&id);
        inner.links.remove(&id);
        Ok(())
    }

    fn load_children(&self, parent: EntityId) -> Result<Vec<Entity>> {
        let inner = self.lock();
        let child_ids = inner.links.get(&parent).cloned().unwrap_or_default();
        child_ids
            .into_iter()
            .map(|id| {
                inner
                    .entities
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| Error::Remote(format!("dangling link to {}", id)))
            })
            .collect()
    }

    fn upload_chunk(&self, filename: &str, offset: u64, chunk: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_upload_of.as_deref() == Some(filename) {
            return Err(Error::Remote(format!("upload refused: {}", filename)));
        }
        let buffer = inner.uploads.entry(filename.to_string()).or_default();
        if buffer.len() as u64 != offset {
            return Err(Error::Remote(format!(
                "upload offset mismatch for {}: expected {}, got {}",
                filename,
                buffer.len(),
                offset
            )));
        }
        buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn finalize_upload(&self, filename: &str) -> Result<StagedFile> {
        let size = self.stage_size;
        let mut inner = self.lock();
        let bytes = inner
            .uploads
            .get(filename)
            .cloned()
            .ok_or_else(|| Error::Remote(format!("no upload named {}", filename)))?;

        let plane_len = (size.size_x * size.size_y) as usize;
        let mut planes = HashMap::new();
        for index in 0..Self::plane_count(size) {
            let start = index * plane_len;
            let mut plane = vec![0u8; plane_len];
            if start < bytes.len() {
                let end = usize::min(start + plane_len, bytes.len());
                plane[..end - start].copy_from_slice(&bytes[start..end]);
            }
            planes.insert(index, plane);
        }

        let id = inner.allocate_id();
        inner.pixel_sets.insert(
            id,
            PixelSet {
                size,
                planes,
                pending: HashMap::new(),
                save_count: 0,
            },
        );
        Ok(StagedFile {
            pixels: id,
            size,
            series_count: 1,
        })
    }

    fn create_image(&self, name: &str, size: ImportSize) -> Result<CreatedImage> {
        let mut inner = self.lock();
        let image_id = inner.allocate_id();
        let mut image = Entity::new(EntityKind::Image, name);
        image
            .mark_persisted(image_id)
            .map_err(|e| Error::Remote(e.to_string()))?;
        inner.entities.insert(image_id, image.clone());

        let pixels_id = inner.allocate_id();
        inner.pixel_sets.insert(
            pixels_id,
            PixelSet {
                size,
                planes: HashMap::new(),
                pending: HashMap::new(),
                save_count: 0,
            },
        );
        Ok(CreatedImage {
            image,
            pixels: pixels_id,
        })
    }

    fn link(&self, parent: EntityId, child: EntityId) -> Result<()> {
        let mut inner = self.lock();
        if !inner.entities.contains_key(&parent) {
            return Err(Error::Remote(format!("link parent {} not found", parent)));
        }
        let children = inner.links.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
        Ok(())
    }

    fn open_pixel_reader(&self, pixels: EntityId) -> Result<Box<dyn PixelReader>> {
        let inner = self.lock();
        let set = inner
            .pixel_sets
            .get(&pixels)
            .ok_or_else(|| Error::Remote(format!("pixel set {} not found", pixels)))?;
        Ok(Box::new(MemoryReader {
            store: Arc::clone(&self.inner),
            pixels,
            size: set.size,
            closed: false,
        }))
    }

    fn open_pixel_writer(&self, pixels: EntityId) -> Result<Box<dyn PixelWriter>> {
        let inner = self.lock();
        let set = inner
            .pixel_sets
            .get(&pixels)
            .ok_or_else(|| Error::Remote(format!("pixel set {} not found", pixels)))?;
        Ok(Box::new(MemoryWriter {
            store: Arc::clone(&self.inner),
            pixels,
            size: set.size,
            closed: false,
        }))
    }

    fn archive_original(&self, filename: &str, _pixels: EntityId) -> Result<()> {
        self.lock().archived.push(filename.to_string());
        Ok(())
    }

    fn create_thumbnail(&self, pixels: EntityId) -> Result<()> {
        self.lock().thumbnails.push(pixels);
        Ok(())
    }
}

struct MemoryReader {
    store: Arc<Mutex<Inner>>,
    pixels: EntityId,
    size: ImportSize,
    closed: bool,
}

impl PixelReader for MemoryReader {
    fn dimensions(&self) -> ImportSize {
        self.size
    }

    fn read_plane(&mut self, z: i32, c: i32, t: i32) -> Result<Vec<u8>> {
        if self.closed {
            return Err(Error::Remote("read on closed handle".to_string()));
        }
        let index = crate::transfer::linearize(z, c, t, self.size.size_z, self.size.size_c)?;
        let inner = self.store.lock().expect("store mutex poisoned");
        let set = inner
            .pixel_sets
            .get(&self.pixels)
            .ok_or_else(|| Error::Remote(format!("pixel set {} not found", self.pixels)))?;
        set.planes
            .get(&index)
            .cloned()
            .ok_or_else(|| Error::Remote(format!("plane {} missing", index)))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.store.lock().expect("store mutex poisoned").reader_closes += 1;
        }
        Ok(())
    }
}

struct MemoryWriter {
    store: Arc<Mutex<Inner>>,
    pixels: EntityId,
    size: ImportSize,
    closed: bool,
}

impl PixelWriter for MemoryWriter {
    fn dimensions(&self) -> ImportSize {
        self.size
    }

    fn write_plane(&mut self, bytes: &[u8], z: i32, c: i32, t: i32) -> Result<()> {
        if self.closed {
            return Err(Error::Remote("write on closed handle".to_string()));
        }
        let index = crate::transfer::linearize(z, c, t, self.size.size_z, self.size.size_c)?;
        let mut inner = self.store.lock().expect("store mutex poisoned");
        if inner.fail_write_on_plane == Some(index) {
            return Err(Error::Remote(format!("injected write failure on plane {}", index)));
        }
        let set = inner
            .pixel_sets
            .get_mut(&self.pixels)
            .ok_or_else(|| Error::Remote(format!("pixel set {} not found", self.pixels)))?;
        set.pending.insert(index, bytes.to_vec());
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Remote("save on closed handle".to_string()));
        }
        let mut inner = self.store.lock().expect("store mutex poisoned");
        if inner.fail_on_save {
            return Err(Error::Remote("injected save failure".to_string()));
        }
        let set = inner
            .pixel_sets
            .get_mut(&self.pixels)
            .ok_or_else(|| Error::Remote(format!("pixel set {} not found", self.pixels)))?;
        let pending = std::mem::take(&mut set.pending);
        set.planes.extend(pending);
        set.save_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.store.lock().expect("store mutex poisoned").writer_closes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_2x2() -> ImportSize {
        ImportSize {
            size_x: 2,
            size_y: 2,
            size_z: 1,
            size_c: 1,
            size_t: 1,
        }
    }

    #[test]
    fn create_assigns_ids_and_clears_dirty() {
        let store = InMemoryStore::new(size_2x2());
        let created = store.create(Entity::new(EntityKind::Dataset, "d")).unwrap();
        assert!(created.id().is_some());
        assert!(!created.is_dirty());
        let fetched = store.get(EntityKind::Dataset, created.id().unwrap()).unwrap();
        assert!(fetched.same_as(&created));
    }

    #[test]
    fn upload_offsets_must_be_sequential() {
        let store = InMemoryStore::new(size_2x2());
        store.upload_chunk("a.tiff", 0, &[1, 2]).unwrap();
        assert!(store.upload_chunk("a.tiff", 5, &[3]).is_err());
        store.upload_chunk("a.tiff", 2, &[3, 4]).unwrap();
        let staged = store.finalize_upload("a.tiff").unwrap();
        assert_eq!(staged.size, size_2x2());
        assert_eq!(store.committed_planes(staged.pixels)[&0], vec![1, 2, 3, 4]);
    }

    #[test]
    fn writes_commit_only_on_save() {
        let store = InMemoryStore::new(size_2x2());
        let pixels = store.seed_pixels(size_2x2(), HashMap::new());
        let mut writer = store.open_pixel_writer(pixels).unwrap();
        writer.write_plane(&[9, 9, 9, 9], 0, 0, 0).unwrap();
        assert!(store.committed_planes(pixels).is_empty());
        writer.save().unwrap();
        writer.close().unwrap();
        assert_eq!(store.committed_planes(pixels)[&0], vec![9, 9, 9, 9]);
        assert_eq!(store.save_count(pixels), 1);
        assert_eq!(store.writer_closes(), 1);
    }

    #[test]
    fn load_children_follows_links() {
        let store = InMemoryStore::new(size_2x2());
        let dataset = store.create(Entity::new(EntityKind::Dataset, "d")).unwrap();
        let image = store.create(Entity::new(EntityKind::Image, "i")).unwrap();
        store
            .link(dataset.id().unwrap(), image.id().unwrap())
            .unwrap();
        let children = store.load_children(dataset.id().unwrap()).unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].same_as(&image));
    }
}
