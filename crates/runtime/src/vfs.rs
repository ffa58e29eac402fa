//! Virtual file system
//!
//! In-memory hierarchical store behind the `File*` built-ins. Paths are
//! normalized before every lookup: backslashes become slashes, case is
//! folded, repeated slashes collapse and a leading slash is added.
//!
//! Failures never raise: operations return `-1` or an empty result and
//! the caller checks the sentinel.

use regex::Regex;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Directories present in a fresh file system
const SEEDED_DIRECTORIES: &[&str] = &["/", "/nvram", "/user"];

// Open flags, matching the `_O_*` system constants
pub const O_RDONLY: i64 = 0;
pub const O_WRONLY: i64 = 1;
pub const O_RDWR: i64 = 2;
pub const O_APPEND: i64 = 8;
pub const O_CREAT: i64 = 256;
pub const O_TRUNC: i64 = 512;
pub const O_TEXT: i64 = 0x4000;
pub const O_BINARY: i64 = 0x8000;

// Seek origins
pub const SEEK_SET: i64 = 0;
pub const SEEK_CUR: i64 = 1;
pub const SEEK_END: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub is_dir: bool,
    pub data: Vec<u8>,
    pub modified: SystemTime,
}

impl FileEntry {
    fn directory(path: &str) -> Self {
        FileEntry {
            path: path.to_string(),
            is_dir: true,
            data: Vec::new(),
            modified: SystemTime::now(),
        }
    }

    fn file(path: &str) -> Self {
        FileEntry {
            path: path.to_string(),
            is_dir: false,
            data: Vec::new(),
            modified: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate
    Write,
    /// Create if missing, cursor at end
    Append,
}

impl OpenMode {
    pub fn from_flags(flags: i64) -> OpenMode {
        if flags & O_APPEND != 0 {
            OpenMode::Append
        } else if flags & (O_WRONLY | O_RDWR | O_CREAT | O_TRUNC) != 0 {
            OpenMode::Write
        } else {
            OpenMode::Read
        }
    }
}

#[derive(Debug, Clone)]
struct OpenFile {
    path: String,
    mode: OpenMode,
    cursor: usize,
}

// Handle table with ID reuse via free list
#[derive(Debug, Default)]
struct HandleTable {
    handles: Vec<Option<OpenFile>>,
    free_ids: Vec<usize>,
}

impl HandleTable {
    fn allocate(&mut self, file: OpenFile) -> i64 {
        if let Some(id) = self.free_ids.pop() {
            self.handles[id] = Some(file);
            return id as i64;
        }
        self.handles.push(Some(file));
        (self.handles.len() - 1) as i64
    }

    fn get_mut(&mut self, id: i64) -> Option<&mut OpenFile> {
        let idx = usize::try_from(id).ok()?;
        self.handles.get_mut(idx)?.as_mut()
    }

    fn get(&self, id: i64) -> Option<&OpenFile> {
        let idx = usize::try_from(id).ok()?;
        self.handles.get(idx)?.as_ref()
    }

    fn free(&mut self, id: i64) -> bool {
        let Ok(idx) = usize::try_from(id) else {
            return false;
        };
        if let Some(slot) = self.handles.get_mut(idx)
            && slot.is_some()
        {
            *slot = None;
            self.free_ids.push(idx);
            return true;
        }
        false
    }
}

/// Ordered results of one FindFirst call, paged by FindNext
#[derive(Debug)]
struct FindSession {
    matches: Vec<String>,
    next: usize,
}

type ChangeListener = Box<dyn FnMut()>;

pub struct VirtualFileSystem {
    entries: BTreeMap<String, FileEntry>,
    handles: HandleTable,
    find: Option<FindSession>,
    listener: Option<ChangeListener>,
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VirtualFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileSystem")
            .field("entries", &self.entries.len())
            .field("handles", &self.handles)
            .finish()
    }
}

/// Canonical form of a path
pub fn normalize_path(path: &str) -> String {
    let lowered = path.replace('\\', "/").to_lowercase();
    let parts: Vec<&str> = lowered.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `*` and `?` wildcards as an anchored regex
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        let mut vfs = VirtualFileSystem {
            entries: BTreeMap::new(),
            handles: HandleTable::default(),
            find: None,
            listener: None,
        };
        vfs.seed();
        vfs
    }

    fn seed(&mut self) {
        for dir in SEEDED_DIRECTORIES {
            self.entries
                .insert(dir.to_string(), FileEntry::directory(dir));
        }
    }

    /// Called after every mutation
    pub fn set_change_listener(&mut self, listener: impl FnMut() + 'static) {
        self.listener = Some(Box::new(listener));
    }

    fn changed(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener();
        }
    }

    /// Create `path` and any missing parents as directories
    fn ensure_directories(&mut self, path: &str) {
        let mut missing = Vec::new();
        let mut current = Some(path);
        while let Some(dir) = current {
            if self.entries.contains_key(dir) {
                break;
            }
            missing.push(dir.to_string());
            current = parent_of(dir);
        }
        for dir in missing.into_iter().rev() {
            self.entries
                .insert(dir.clone(), FileEntry::directory(&dir));
        }
    }

    /// Handle ≥ 0, or -1 for a missing file in read mode or a directory
    pub fn open(&mut self, path: &str, mode: OpenMode) -> i64 {
        let path = normalize_path(path);
        match self.entries.get_mut(&path) {
            Some(entry) if entry.is_dir => return -1,
            Some(entry) => {
                if mode == OpenMode::Write {
                    entry.data.clear();
                    entry.modified = SystemTime::now();
                }
            }
            None => {
                if mode == OpenMode::Read {
                    return -1;
                }
                if let Some(parent) = parent_of(&path) {
                    let parent = parent.to_string();
                    if self.entries.get(&parent).is_some_and(|e| !e.is_dir) {
                        return -1;
                    }
                    self.ensure_directories(&parent);
                }
                self.entries.insert(path.clone(), FileEntry::file(&path));
            }
        }

        let cursor = match mode {
            OpenMode::Append => self.entries.get(&path).map_or(0, |e| e.data.len()),
            _ => 0,
        };
        let handle = self.handles.allocate(OpenFile { path, mode, cursor });
        if mode != OpenMode::Read {
            self.changed();
        }
        handle
    }

    pub fn close(&mut self, handle: i64) -> i64 {
        if self.handles.free(handle) { 0 } else { -1 }
    }

    /// Up to `max` bytes from the cursor; `None` for a bad handle
    pub fn read(&mut self, handle: i64, max: usize) -> Option<Vec<u8>> {
        let file = self.handles.get_mut(handle)?;
        let entry = self.entries.get(&file.path)?;
        let start = file.cursor.min(entry.data.len());
        let end = start.saturating_add(max).min(entry.data.len());
        let bytes = entry.data[start..end].to_vec();
        file.cursor = end;
        Some(bytes)
    }

    /// Bytes written, or -1 for a bad or read-only handle
    pub fn write(&mut self, handle: i64, bytes: &[u8]) -> i64 {
        let Some(file) = self.handles.get_mut(handle) else {
            return -1;
        };
        if file.mode == OpenMode::Read {
            return -1;
        }
        let Some(entry) = self.entries.get_mut(&file.path) else {
            return -1;
        };
        let Some(end) = file.cursor.checked_add(bytes.len()) else {
            return -1;
        };
        if entry.data.len() < end {
            entry.data.resize(end, 0);
        }
        entry.data[file.cursor..end].copy_from_slice(bytes);
        entry.modified = SystemTime::now();
        file.cursor = end;
        self.changed();
        bytes.len() as i64
    }

    /// New cursor position (clamped to the file's bounds), or -1 for a bad
    /// handle
    pub fn seek(&mut self, handle: i64, offset: i64, origin: i64) -> i64 {
        let Some(file) = self.handles.get_mut(handle) else {
            return -1;
        };
        let len = self.entries.get(&file.path).map_or(0, |e| e.data.len()) as i64;
        let base = match origin {
            SEEK_CUR => file.cursor as i64,
            SEEK_END => len,
            _ => 0,
        };
        let target = base.saturating_add(offset).clamp(0, len);
        file.cursor = target as usize;
        target
    }

    pub fn length(&self, handle: i64) -> i64 {
        self.handles
            .get(handle)
            .and_then(|f| self.entries.get(&f.path))
            .map_or(-1, |e| e.data.len() as i64)
    }

    /// Remove a file or an empty directory
    pub fn delete(&mut self, path: &str) -> i64 {
        let path = normalize_path(path);
        if SEEDED_DIRECTORIES.contains(&path.as_str()) {
            return -1;
        }
        let Some(entry) = self.entries.get(&path) else {
            return -1;
        };
        if entry.is_dir && self.children(&path).next().is_some() {
            return -1;
        }
        self.entries.remove(&path);
        self.changed();
        0
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize_path(path))
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.entries
            .get(&normalize_path(path))
            .is_some_and(|e| e.is_dir)
    }

    /// Idempotent; -1 only if a file is in the way
    pub fn make_directory(&mut self, path: &str) -> i64 {
        let path = normalize_path(path);
        match self.entries.get(&path) {
            Some(entry) if entry.is_dir => 0,
            Some(_) => -1,
            None => {
                self.ensure_directories(&path);
                self.changed();
                0
            }
        }
    }

    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a FileEntry> + 'a {
        self.entries
            .values()
            .filter(move |e| e.path != "/" && parent_of(&e.path) == Some(dir))
    }

    /// Start a find session; returns the first file name or ""
    pub fn find_first(&mut self, pattern: &str) -> String {
        let pattern = normalize_path(pattern);
        let (dir, glob) = match pattern.rfind('/') {
            Some(0) => ("/".to_string(), &pattern[1..]),
            Some(idx) => (pattern[..idx].to_string(), &pattern[idx + 1..]),
            None => ("/".to_string(), pattern.as_str()),
        };
        let matches = match glob_to_regex(glob) {
            Ok(re) => self
                .children(&dir)
                .filter(|e| !e.is_dir)
                .map(|e| file_name(&e.path).to_string())
                .filter(|name| re.is_match(name))
                .collect(),
            Err(_) => Vec::new(),
        };
        self.find = Some(FindSession { matches, next: 0 });
        self.find_next()
    }

    /// Next name of the current session, "" when exhausted
    pub fn find_next(&mut self) -> String {
        let Some(session) = self.find.as_mut() else {
            return String::new();
        };
        match session.matches.get(session.next) {
            Some(name) => {
                session.next += 1;
                name.clone()
            }
            None => String::new(),
        }
    }

    pub fn find_close(&mut self) -> i64 {
        if self.find.take().is_some() { 0 } else { -1 }
    }

    /// Host-side view of a file's bytes
    pub fn contents(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .get(&normalize_path(path))
            .filter(|e| !e.is_dir)
            .map(|e| e.data.as_slice())
    }

    /// Host-side write that bypasses handles (fixtures, UI uploads)
    pub fn put_file(&mut self, path: &str, bytes: &[u8]) -> bool {
        let handle = self.open(path, OpenMode::Write);
        if handle < 0 {
            return false;
        }
        let written = self.write(handle, bytes);
        self.close(handle);
        written >= 0
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    /// Drop everything and reseed; the change listener is kept
    pub fn clear(&mut self) {
        self.entries.clear();
        self.handles = HandleTable::default();
        self.find = None;
        self.seed();
        self.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("\\USER\\\\Config.TXT"), "/user/config.txt");
        assert_eq!(normalize_path("nvram/a/"), "/nvram/a");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_read_of_missing_file_fails() {
        let mut vfs = VirtualFileSystem::new();
        assert_eq!(vfs.open("/user/missing.txt", OpenMode::Read), -1);
        assert_eq!(vfs.open("/user", OpenMode::Read), -1);
        assert_eq!(vfs.open("/user", OpenMode::Write), -1);
    }

    #[test]
    fn test_write_then_read_back() {
        let mut vfs = VirtualFileSystem::new();
        let h = vfs.open("/user/logs/today.txt", OpenMode::Write);
        assert!(h >= 0);
        assert_eq!(vfs.write(h, b"hello world"), 11);
        assert_eq!(vfs.close(h), 0);
        assert!(vfs.is_directory("/USER/LOGS"));

        let r = vfs.open("\\user\\logs\\TODAY.txt", OpenMode::Read);
        assert_eq!(vfs.length(r), 11);
        assert_eq!(vfs.read(r, 5).unwrap(), b"hello");
        assert_eq!(vfs.read(r, 100).unwrap(), b" world");
        assert_eq!(vfs.read(r, 100).unwrap(), b"");
        assert_eq!(vfs.write(r, b"x"), -1);
    }

    #[test]
    fn test_append_and_truncate_modes() {
        let mut vfs = VirtualFileSystem::new();
        assert!(vfs.put_file("/nvram/state", b"abc"));

        let a = vfs.open("/nvram/state", OpenMode::from_flags(O_WRONLY | O_APPEND));
        vfs.write(a, b"def");
        vfs.close(a);
        assert_eq!(vfs.contents("/nvram/state").unwrap(), b"abcdef");

        let w = vfs.open("/nvram/state", OpenMode::from_flags(O_WRONLY | O_TRUNC));
        vfs.write(w, b"z");
        vfs.close(w);
        assert_eq!(vfs.contents("/nvram/state").unwrap(), b"z");
    }

    #[test]
    fn test_seek_is_clamped() {
        let mut vfs = VirtualFileSystem::new();
        vfs.put_file("/f", b"0123456789");
        let h = vfs.open("/f", OpenMode::Read);
        assert_eq!(vfs.seek(h, -5, SEEK_SET), 0);
        assert_eq!(vfs.seek(h, -3, SEEK_END), 7);
        assert_eq!(vfs.read(h, 10).unwrap(), b"789");
        assert_eq!(vfs.seek(h, -2, SEEK_CUR), 8);
        assert_eq!(vfs.seek(99, 0, SEEK_SET), -1);
    }

    #[test]
    fn test_seek_past_end_stops_at_length() {
        let mut vfs = VirtualFileSystem::new();
        let h = vfs.open("/user/a.txt", OpenMode::from_flags(O_WRONLY | O_CREAT));
        vfs.write(h, b"abc");
        assert_eq!(vfs.seek(h, i64::MAX, SEEK_SET), 3);
        assert_eq!(vfs.seek(h, i64::MAX, SEEK_CUR), 3);
        assert_eq!(vfs.write(h, b"x"), 1);
        vfs.close(h);
        assert_eq!(vfs.contents("/user/a.txt").unwrap(), b"abcx");
    }

    #[test]
    fn test_handles_are_reused() {
        let mut vfs = VirtualFileSystem::new();
        vfs.put_file("/a", b"");
        let first = vfs.open("/a", OpenMode::Read);
        vfs.close(first);
        assert_eq!(vfs.open("/a", OpenMode::Read), first);
        assert_eq!(vfs.close(42), -1);
    }

    #[test]
    fn test_make_directory_is_idempotent_and_delete_rules() {
        let mut vfs = VirtualFileSystem::new();
        assert_eq!(vfs.make_directory("/user/presets"), 0);
        assert_eq!(vfs.make_directory("/user/presets"), 0);
        vfs.put_file("/user/presets/one.dat", b"1");
        assert_eq!(vfs.make_directory("/user/presets/one.dat"), -1);
        assert_eq!(vfs.delete("/user/presets"), -1);
        assert_eq!(vfs.delete("/user/presets/one.dat"), 0);
        assert_eq!(vfs.delete("/user/presets"), 0);
        assert_eq!(vfs.delete("/user"), -1);
        assert_eq!(vfs.delete("/nothing"), -1);
    }

    #[test]
    fn test_find_session_matches_direct_children_in_order() {
        let mut vfs = VirtualFileSystem::new();
        vfs.put_file("/user/b.txt", b"");
        vfs.put_file("/user/a.txt", b"");
        vfs.put_file("/user/a.log", b"");
        vfs.put_file("/user/sub/c.txt", b"");

        assert_eq!(vfs.find_first("/user/*.txt"), "a.txt");
        assert_eq!(vfs.find_next(), "b.txt");
        assert_eq!(vfs.find_next(), "");
        assert_eq!(vfs.find_close(), 0);
        assert_eq!(vfs.find_next(), "");

        assert_eq!(vfs.find_first("/user/?.log"), "a.log");
        assert_eq!(vfs.find_first("/user/*.none"), "");
    }

    #[test]
    fn test_change_listener_fires_on_mutation() {
        let mut vfs = VirtualFileSystem::new();
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        vfs.set_change_listener(move || seen.set(seen.get() + 1));

        vfs.make_directory("/user/x");
        vfs.put_file("/user/x/y", b"data");
        assert!(count.get() >= 2);

        let before = count.get();
        vfs.exists("/user/x/y");
        assert_eq!(count.get(), before);
    }

    #[test]
    fn test_clear_reseeds() {
        let mut vfs = VirtualFileSystem::new();
        vfs.put_file("/user/a", b"1");
        vfs.clear();
        assert!(!vfs.exists("/user/a"));
        assert!(vfs.is_directory("/nvram"));
    }
}
