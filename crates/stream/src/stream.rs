use std::{
    cell::{Cell, OnceCell},
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    os::{
        fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd},
        unix::fs::{FileTypeExt, MetadataExt},
    },
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
};

use nix::{
    fcntl::{fcntl, FcntlArg, OFlag},
    sys::stat::SFlag,
};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::{errors::StreamError, mode};

/// Largest single read handed to a pipe.
const PIPE_CHUNK_SIZE: usize = 8192;

/// Snapshot of a descriptor's properties (`mode`, `seekable`, `uri`...).
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug)]
struct Resource {
    file: File,
    mode: String,
    uri: Option<PathBuf>,
    eof: bool,
    // set for process pipes; closing waits for it
    child: Option<Child>,
}

impl Resource {
    fn describe(&self) -> String {
        match &self.uri {
            Some(uri) => format!("{}", uri.display()),
            None => format!("fd {}", self.file.as_raw_fd()),
        }
    }
}

/// Derived state, valid for one attached descriptor only.
#[derive(Debug, Default)]
struct Cache {
    readable: OnceCell<bool>,
    writable: OnceCell<bool>,
    seekable: OnceCell<bool>,
    pipe: OnceCell<bool>,
    size: Cell<Option<u64>>,
}

/// Readable/writable/seekable wrapper around one exclusively owned descriptor.
///
/// A `Stream` may also be detached (no descriptor), in which case every
/// predicate reports `false`, [`Stream::eof`] reports `true` and I/O fails with
/// [`StreamError::Detached`] or the matching capability error.
///
/// Dropping an attached stream closes it.
#[derive(Debug, Default)]
pub struct Stream {
    resource: Option<Resource>,
    metadata: Option<Metadata>,
    cache: Cache,
}

impl Stream {
    /// Wraps an already opened descriptor.
    pub fn new(handle: impl Into<OwnedFd>) -> Result<Self, StreamError> {
        let mut stream = Self::default();
        stream.attach(handle)?;
        Ok(stream)
    }

    /// Opens `path` with an fopen-style `mode` (`r`, `w+`, `ab`, `x`, `c+`...).
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let mode = mode::normalize(mode)?;

        let file = mode::open_options(&mode)
            .open(path)
            .map_err(|err| StreamError::io("open", path.display().to_string(), err))?;

        let mut stream = Self::default();
        stream.attach_resource(Resource {
            file,
            mode,
            uri: Some(path.to_path_buf()),
            eof: false,
            child: None,
        });
        Ok(stream)
    }

    /// Spawns `command` and attaches to its stdout (`r`) or stdin (`w`).
    ///
    /// Closing the stream waits for the child process.
    pub fn spawn(command: &mut Command, mode: &str) -> Result<Self, StreamError> {
        let mode = mode::normalize(mode)?;
        let reading = match mode.trim_end_matches('b') {
            "r" => true,
            "w" => false,
            _ => return Err(StreamError::InvalidMode(mode)),
        };

        if reading {
            command.stdout(Stdio::piped());
        } else {
            command.stdin(Stdio::piped());
        }

        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .spawn()
            .map_err(|err| StreamError::io("spawn", program.clone(), err))?;

        let fd: Option<OwnedFd> = if reading {
            child.stdout.take().map(Into::into)
        } else {
            child.stdin.take().map(Into::into)
        };
        let fd = fd.ok_or_else(|| {
            StreamError::io("spawn", program.clone(), io::Error::other("pipe not captured"))
        })?;

        debug!("spawned '{}' (pid {}) as a {} pipe", program, child.id(), mode);

        let mut stream = Self::default();
        stream.attach_resource(Resource {
            file: File::from(fd),
            mode,
            uri: None,
            eof: false,
            child: Some(child),
        });
        Ok(stream)
    }

    /// Attaches a new descriptor, detaching (not closing) the current one.
    pub fn attach(&mut self, handle: impl Into<OwnedFd>) -> Result<(), StreamError> {
        let fd: OwnedFd = handle.into();
        let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)
            .map_err(|errno| StreamError::InvalidResource(errno.into()))?;

        self.attach_resource(Resource {
            file: File::from(fd),
            mode: mode::from_flags(OFlag::from_bits_truncate(flags)).to_string(),
            uri: None,
            eof: false,
            child: None,
        });
        Ok(())
    }

    fn attach_resource(&mut self, resource: Resource) {
        if self.resource.is_some() {
            // the previous descriptor is released when the returned fd drops
            drop(self.detach());
        }

        debug!("attached {} with mode '{}'", resource.describe(), resource.mode);
        self.resource = Some(resource);
        self.metadata = None;
        self.cache = Cache::default();
    }

    fn take_resource(&mut self) -> Option<Resource> {
        self.metadata = None;
        self.cache = Cache::default();
        self.resource.take()
    }

    /// Gives the descriptor back to the caller without closing it.
    ///
    /// For a stream made by [`Stream::spawn`], an already exited child is
    /// reaped here; a child still running is released unreaped and is left to
    /// the caller's process. Use [`Stream::detach_process`] to keep it.
    pub fn detach(&mut self) -> Option<OwnedFd> {
        let (fd, child) = self.detach_process()?;

        if let Some(mut child) = child {
            match child.try_wait() {
                Ok(Some(status)) => debug!("reaped child {} on detach: {}", child.id(), status),
                Ok(None) => warn!("child {} still running, released unreaped", child.id()),
                Err(err) => warn!("checking child {} on detach failed: {}", child.id(), err),
            }
        }

        Some(fd)
    }

    /// Like [`Stream::detach`], also handing back the child of a spawned
    /// stream so the caller can wait for it.
    pub fn detach_process(&mut self) -> Option<(OwnedFd, Option<Child>)> {
        let resource = self.take_resource()?;
        debug!("detached {}", resource.describe());

        let Resource { file, child, .. } = resource;
        Some((file.into(), child))
    }

    /// Closes the descriptor and leaves the stream detached. Process pipes
    /// also wait for their child. No-op when already detached.
    pub fn close(&mut self) -> Result<(), StreamError> {
        let pipe = self.is_pipe();
        let Some(resource) = self.take_resource() else {
            return Ok(());
        };

        if pipe {
            close_pipe(resource)
        } else {
            close_file(resource)
        }
    }

    pub fn is_attached(&self) -> bool {
        self.resource.is_some()
    }

    pub fn is_pipe(&self) -> bool {
        *self.cache.pipe.get_or_init(|| {
            let Some(resource) = &self.resource else {
                return false;
            };

            match resource.file.metadata() {
                Ok(stat) => {
                    let pipe = stat.mode() & u32::from(SFlag::S_IFIFO.bits()) != 0;
                    trace!("{} is_pipe = {}", resource.describe(), pipe);
                    pipe
                },
                Err(err) => {
                    debug!("fstat on {} failed: {}", resource.describe(), err);
                    false
                },
            }
        })
    }

    /// Size in bytes, `None` for pipes and detached streams.
    pub fn size(&self) -> Result<Option<u64>, StreamError> {
        if let Some(size) = self.cache.size.get() {
            return Ok(Some(size));
        }

        let Some(resource) = &self.resource else {
            return Ok(None);
        };

        if self.is_pipe() {
            return Ok(None);
        }

        let stat = resource
            .file
            .metadata()
            .map_err(|err| StreamError::io("stat", resource.describe(), err))?;

        self.cache.size.set(Some(stat.len()));
        Ok(Some(stat.len()))
    }

    pub fn tell(&self) -> Result<u64, StreamError> {
        let resource = self.resource.as_ref().ok_or(StreamError::Detached)?;

        if self.is_pipe() {
            return Err(StreamError::PipePosition(resource.describe()));
        }

        (&resource.file)
            .stream_position()
            .map_err(|err| StreamError::io("tell", resource.describe(), err))
    }

    pub fn eof(&self) -> bool {
        self.resource.as_ref().map_or(true, |resource| resource.eof)
    }

    pub fn is_readable(&self) -> bool {
        *self.cache.readable.get_or_init(|| match &self.resource {
            Some(resource) => self.is_pipe() || mode::is_readable_mode(&resource.mode),
            None => false,
        })
    }

    pub fn is_writable(&self) -> bool {
        *self.cache.writable.get_or_init(|| match &self.resource {
            Some(resource) => mode::is_writable_mode(&resource.mode),
            None => false,
        })
    }

    pub fn is_seekable(&self) -> bool {
        *self.cache.seekable.get_or_init(|| match &self.resource {
            Some(resource) => !self.is_pipe() && probe_seekable(resource),
            None => false,
        })
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<(), StreamError> {
        self.seek_as("seek", pos)
    }

    pub fn rewind(&mut self) -> Result<(), StreamError> {
        self.seek_as("rewind", SeekFrom::Start(0))
    }

    fn seek_as(&mut self, op: &'static str, pos: SeekFrom) -> Result<(), StreamError> {
        if !self.is_seekable() {
            return Err(StreamError::NotSeekable(self.describe()));
        }

        let resource = self.resource.as_mut().ok_or(StreamError::Detached)?;
        resource
            .file
            .seek(pos)
            .map_err(|err| StreamError::io(op, resource.describe(), err))?;
        resource.eof = false;

        Ok(())
    }

    /// Reads up to `length` bytes.
    ///
    /// Regular files are read until `length` bytes or end of file; pipes
    /// return after the first chunk. An empty vector means end of stream.
    /// Memory grows with the bytes actually read, not with `length`.
    pub fn read(&mut self, length: usize) -> Result<Vec<u8>, StreamError> {
        if !self.is_readable() {
            return Err(StreamError::NotReadable(self.describe()));
        }

        let pipe = self.is_pipe();
        let resource = self.resource.as_mut().ok_or(StreamError::Detached)?;

        if length == 0 {
            return Ok(vec![]);
        }

        let buffer = if pipe {
            read_chunk(&mut resource.file, length.min(PIPE_CHUNK_SIZE))
        } else {
            read_up_to(&mut resource.file, length)
        }
        .map_err(|err| StreamError::io("read", resource.describe(), err))?;

        if buffer.is_empty() || (!pipe && buffer.len() < length) {
            resource.eof = true;
        }

        Ok(buffer)
    }

    /// Writes all of `data`, returning the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        if !self.is_writable() {
            return Err(StreamError::NotWritable(self.describe()));
        }

        let resource = self.resource.as_mut().ok_or(StreamError::Detached)?;
        resource
            .file
            .write_all(data)
            .map_err(|err| StreamError::io("write", resource.describe(), err))?;
        self.cache.size.set(None);

        Ok(data.len())
    }

    /// Reads everything from the current position to the end of the stream.
    pub fn contents(&mut self) -> Result<Vec<u8>, StreamError> {
        if !self.is_readable() {
            return Err(StreamError::NotReadable(self.describe()));
        }

        let resource = self.resource.as_mut().ok_or(StreamError::Detached)?;
        let mut contents = vec![];
        resource
            .file
            .read_to_end(&mut contents)
            .map_err(|err| StreamError::io("get contents of", resource.describe(), err))?;
        resource.eof = true;

        Ok(contents)
    }

    /// Re-reads the descriptor's metadata. Empty when detached.
    pub fn metadata(&mut self) -> Metadata {
        self.refresh_metadata().clone()
    }

    pub fn metadata_value(&mut self, key: &str) -> Option<Value> {
        self.refresh_metadata().get(key).cloned()
    }

    fn refresh_metadata(&mut self) -> &Metadata {
        let metadata = match &self.resource {
            Some(resource) => self.collect_metadata(resource),
            None => Metadata::new(),
        };

        self.metadata.insert(metadata)
    }

    fn collect_metadata(&self, resource: &Resource) -> Metadata {
        let mut metadata = Metadata::new();
        if let Ok(flags) = fcntl(resource.file.as_raw_fd(), FcntlArg::F_GETFL) {
            let blocked = !OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK);
            metadata.insert("blocked".into(), json!(blocked));
        }
        metadata.insert("eof".into(), json!(resource.eof));
        if let Some(stream_type) = stream_type(resource) {
            metadata.insert("stream_type".into(), json!(stream_type));
        }
        metadata.insert("mode".into(), json!(resource.mode));
        metadata.insert(
            "seekable".into(),
            json!(!self.is_pipe() && probe_seekable(resource)),
        );

        if let Some(uri) = &resource.uri {
            metadata.insert("wrapper_type".into(), json!("plainfile"));
            metadata.insert("uri".into(), json!(uri.to_string_lossy()));
        }

        metadata
    }

    /// Whole content from the start, or empty on any failure.
    pub fn to_bytes(&mut self) -> Vec<u8> {
        if self.resource.is_none() {
            return vec![];
        }

        match self.rewind().and_then(|_| self.contents()) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("ignoring error while stringifying stream: {}", err);
                vec![]
            },
        }
    }

    pub fn to_string_lossy(&mut self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.resource
            .as_ref()
            .map(|resource| resource.file.as_raw_fd())
    }

    fn describe(&self) -> String {
        self.resource
            .as_ref()
            .map_or_else(|| "(detached)".to_string(), Resource::describe)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("closing stream on drop failed: {}", err);
        }
    }
}

fn read_up_to(file: &mut File, length: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![];
    file.take(u64::try_from(length).unwrap_or(u64::MAX))
        .read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn read_chunk(file: &mut File, capacity: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; capacity];
    loop {
        match file.read(&mut buffer) {
            Ok(read) => {
                buffer.truncate(read);
                return Ok(buffer);
            },
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Kind of file behind the descriptor, from `fstat`.
fn stream_type(resource: &Resource) -> Option<&'static str> {
    let file_type = resource.file.metadata().ok()?.file_type();

    let stream_type = if file_type.is_file() {
        "file"
    } else if file_type.is_fifo() {
        "fifo"
    } else if file_type.is_socket() {
        "socket"
    } else if file_type.is_char_device() {
        "char_device"
    } else if file_type.is_block_device() {
        "block_device"
    } else if file_type.is_dir() {
        "dir"
    } else {
        return None;
    };

    Some(stream_type)
}

fn probe_seekable(resource: &Resource) -> bool {
    (&resource.file).stream_position().is_ok()
}

fn close_file(resource: Resource) -> Result<(), StreamError> {
    let target = resource.describe();
    debug!("closing {}", target);

    nix::unistd::close(resource.file.into_raw_fd())
        .map_err(|errno| StreamError::io("close", target, errno.into()))
}

fn close_pipe(resource: Resource) -> Result<(), StreamError> {
    let target = resource.describe();
    debug!("closing pipe {}", target);

    let Resource { file, child, .. } = resource;
    nix::unistd::close(file.into_raw_fd())
        .map_err(|errno| StreamError::io("close pipe", target.clone(), errno.into()))?;

    if let Some(mut child) = child {
        let status = child
            .wait()
            .map_err(|err| StreamError::io("wait for", format!("child of {target}"), err))?;
        debug!("pipe child {} exited with {}", child.id(), status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn setup() -> String {
        let test_dir = format!("/tmp/unit_test_{}", Uuid::new_v4());
        std::fs::create_dir(&test_dir).unwrap();
        test_dir
    }

    fn teardown(test_dir: String) {
        std::fs::remove_dir_all(test_dir).unwrap();
    }

    fn pipe_stream() -> (Stream, File) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        (Stream::new(read_end).unwrap(), File::from(write_end))
    }

    #[test]
    fn attach_then_detach_should_return_the_same_descriptor_and_reset_state() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "hello").unwrap();

        let file = File::open(&path).unwrap();
        let raw = file.as_raw_fd();
        let mut stream = Stream::new(file).unwrap();
        assert!(stream.is_readable());
        assert_eq!(stream.size().unwrap(), Some(5));

        let fd = stream.detach().unwrap();

        assert_eq!(fd.as_raw_fd(), raw);
        assert!(!stream.is_attached());
        assert!(!stream.is_readable());
        assert!(!stream.is_writable());
        assert!(!stream.is_seekable());
        assert!(!stream.is_pipe());
        assert_eq!(stream.size().unwrap(), None);
        assert!(stream.eof());
        assert!(stream.detach().is_none());
        teardown(test_dir);
    }

    #[test]
    fn attach_should_replace_the_current_descriptor() {
        let test_dir = setup();
        let first = format!("{test_dir}/first.txt");
        let second = format!("{test_dir}/second.txt");
        std::fs::write(&first, "one").unwrap();
        std::fs::write(&second, "three").unwrap();

        let mut stream = Stream::open(&first, "r").unwrap();
        assert_eq!(stream.size().unwrap(), Some(3));

        stream
            .attach(std::fs::OpenOptions::new().append(true).open(&second).unwrap())
            .unwrap();

        assert_eq!(stream.size().unwrap(), Some(5));
        assert!(!stream.is_readable());
        assert!(stream.is_writable());
        assert_eq!(stream.metadata_value("mode"), Some(json!("a")));
        teardown(test_dir);
    }

    #[test]
    fn open_should_derive_capabilities_from_the_mode() {
        let test_dir = setup();
        let cases = [
            ("r", true, false),
            ("w", false, true),
            ("r+", true, true),
            ("a", false, true),
            ("c+", true, true),
        ];

        for (mode, readable, writable) in cases {
            let path = format!("{test_dir}/{}.txt", Uuid::new_v4());
            std::fs::write(&path, "data").unwrap();

            let stream = Stream::open(&path, mode).unwrap();

            assert_eq!(stream.is_readable(), readable, "readable for {mode}");
            assert_eq!(stream.is_writable(), writable, "writable for {mode}");
            assert!(stream.is_seekable());
        }
        teardown(test_dir);
    }

    #[test]
    fn open_should_reject_an_invalid_mode() {
        let err = Stream::open("/tmp", "z").unwrap_err();

        assert!(err.is_invalid_argument());
        assert_eq!(err.to_string(), "Invalid stream mode 'z'");
    }

    #[test]
    fn open_with_exclusive_mode_should_fail_on_existing_file() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "").unwrap();

        let err = Stream::open(&path, "x").unwrap_err();

        assert!(!err.is_invalid_argument());
        assert!(matches!(err, StreamError::Io { op: "open", .. }));
        teardown(test_dir);
    }

    #[test]
    fn write_should_invalidate_the_cached_size() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");

        let mut stream = Stream::open(&path, "w+").unwrap();
        assert_eq!(stream.size().unwrap(), Some(0));

        assert_eq!(stream.write(b"abc").unwrap(), 3);
        assert_eq!(stream.size().unwrap(), Some(3));

        stream.write(b"de").unwrap();
        assert_eq!(stream.size().unwrap(), Some(5));
        teardown(test_dir);
    }

    #[test]
    fn seek_to_zero_should_succeed_and_bad_seek_should_fail() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "0123456789").unwrap();

        let mut stream = Stream::open(&path, "r").unwrap();
        stream.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(stream.tell().unwrap(), 4);

        stream.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(stream.tell().unwrap(), 0);

        let err = stream.seek(SeekFrom::Current(-100)).unwrap_err();
        assert!(matches!(err, StreamError::Io { op: "seek", .. }));
        teardown(test_dir);
    }

    #[test]
    fn read_should_distinguish_end_of_stream_from_failure() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "hello").unwrap();

        let mut stream = Stream::open(&path, "r").unwrap();
        assert_eq!(stream.read(5).unwrap(), b"hello");
        assert!(!stream.eof());

        assert_eq!(stream.read(5).unwrap(), b"");
        assert!(stream.eof());

        stream.rewind().unwrap();
        assert!(!stream.eof());
        assert_eq!(stream.read(2).unwrap(), b"he");
        assert_eq!(stream.contents().unwrap(), b"llo");
        teardown(test_dir);
    }

    #[test]
    fn read_and_write_should_respect_capabilities() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "hello").unwrap();

        let mut reader = Stream::open(&path, "r").unwrap();
        assert!(matches!(
            reader.write(b"x").unwrap_err(),
            StreamError::NotWritable(_)
        ));

        let mut writer = Stream::open(&path, "a").unwrap();
        assert!(matches!(
            writer.read(1).unwrap_err(),
            StreamError::NotReadable(_)
        ));
        assert!(matches!(
            writer.contents().unwrap_err(),
            StreamError::NotReadable(_)
        ));
        teardown(test_dir);
    }

    #[test]
    fn pipe_should_be_readable_unseekable_and_sizeless() {
        let (mut stream, mut writer) = pipe_stream();

        assert!(stream.is_pipe());
        assert!(stream.is_readable());
        assert!(!stream.is_seekable());
        assert_eq!(stream.size().unwrap(), None);
        assert!(matches!(
            stream.tell().unwrap_err(),
            StreamError::PipePosition(_)
        ));
        assert!(matches!(
            stream.rewind().unwrap_err(),
            StreamError::NotSeekable(_)
        ));

        writer.write_all(b"ping").unwrap();
        drop(writer);
        assert_eq!(stream.read(16).unwrap(), b"ping");
        assert_eq!(stream.read(16).unwrap(), b"");
        assert!(stream.eof());

        stream.close().unwrap();
        assert!(!stream.is_attached());
    }

    #[test]
    fn pipe_write_end_should_still_report_readable() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let _reader = File::from(read_end);
        let mut stream = Stream::new(write_end).unwrap();

        assert!(stream.is_readable());
        assert!(stream.is_writable());
        assert_eq!(stream.write(b"x").unwrap(), 1);
    }

    #[test]
    fn spawn_should_read_child_output_and_wait_on_close() {
        let mut stream = Stream::spawn(Command::new("echo").arg("hello"), "r").unwrap();

        assert!(stream.is_pipe());
        assert_eq!(stream.contents().unwrap(), b"hello\n");
        stream.close().unwrap();
        assert!(!stream.is_attached());
    }

    #[test]
    fn spawn_should_reject_update_modes() {
        let err = Stream::spawn(&mut Command::new("true"), "r+").unwrap_err();

        assert!(err.is_invalid_argument());
    }

    #[test]
    fn stringify_should_be_empty_when_detached_or_unseekable() {
        let mut detached = Stream::default();
        assert_eq!(detached.to_string_lossy(), "");

        let (mut stream, mut writer) = pipe_stream();
        writer.write_all(b"lost").unwrap();
        assert_eq!(stream.to_string_lossy(), "");
    }

    #[test]
    fn stringify_should_return_the_whole_content_from_any_position() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "whole content").unwrap();

        let mut stream = Stream::open(&path, "r").unwrap();
        stream.seek(SeekFrom::End(-3)).unwrap();

        assert_eq!(stream.to_string_lossy(), "whole content");
        teardown(test_dir);
    }

    #[test]
    fn metadata_should_describe_the_descriptor() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "x").unwrap();

        let mut stream = Stream::open(&path, "rb+").unwrap();
        let metadata = stream.metadata();

        assert_eq!(metadata["mode"], json!("r+b"));
        assert_eq!(metadata["seekable"], json!(true));
        assert_eq!(metadata["uri"], json!(path));
        assert_eq!(metadata["eof"], json!(false));
        assert_eq!(metadata["blocked"], json!(true));
        assert_eq!(metadata["stream_type"], json!("file"));
        assert!(!metadata.contains_key("timed_out"));
        assert!(!metadata.contains_key("unread_bytes"));
        assert_eq!(stream.metadata_value("wrapper_type"), Some(json!("plainfile")));
        assert_eq!(stream.metadata_value("missing"), None);

        stream.contents().unwrap();
        assert_eq!(stream.metadata_value("eof"), Some(json!(true)));

        stream.detach();
        assert!(stream.metadata().is_empty());
        assert_eq!(stream.metadata_value("mode"), None);
        teardown(test_dir);
    }

    #[test]
    fn operations_on_a_detached_stream_should_fail() {
        let mut stream = Stream::default();

        assert!(matches!(stream.tell().unwrap_err(), StreamError::Detached));
        assert!(matches!(
            stream.seek(SeekFrom::Start(0)).unwrap_err(),
            StreamError::NotSeekable(_)
        ));
        assert!(matches!(
            stream.read(1).unwrap_err(),
            StreamError::NotReadable(_)
        ));
        assert!(stream.close().is_ok());
    }

    #[test]
    fn read_should_only_allocate_what_the_file_holds() {
        let test_dir = setup();
        let path = format!("{test_dir}/file.txt");
        std::fs::write(&path, "hello").unwrap();

        let mut stream = Stream::open(&path, "r").unwrap();

        assert_eq!(stream.read(usize::MAX).unwrap(), b"hello");
        assert!(stream.eof());
        assert_eq!(stream.read(usize::MAX).unwrap(), b"");
        assert_eq!(stream.read(0).unwrap(), b"");
        teardown(test_dir);
    }

    #[test]
    fn read_on_a_pipe_should_accept_any_length() {
        let (mut stream, mut writer) = pipe_stream();
        writer.write_all(b"chunk").unwrap();

        assert_eq!(stream.read(usize::MAX).unwrap(), b"chunk");
        assert!(!stream.eof());

        drop(writer);
        assert_eq!(stream.read(usize::MAX).unwrap(), b"");
        assert!(stream.eof());
    }

    #[test]
    fn metadata_should_report_the_pipe_file_type() {
        let (mut stream, _writer) = pipe_stream();

        assert_eq!(stream.metadata_value("stream_type"), Some(json!("fifo")));
        assert_eq!(stream.metadata_value("seekable"), Some(json!(false)));
        assert_eq!(stream.metadata_value("uri"), None);
    }

    #[test]
    fn detach_process_should_hand_back_the_spawned_child() {
        let mut stream = Stream::spawn(Command::new("echo").arg("hi"), "r").unwrap();

        let (fd, child) = stream.detach_process().unwrap();
        let mut output = File::from(fd);
        let mut content = String::new();
        output.read_to_string(&mut content).unwrap();
        let status = child.unwrap().wait().unwrap();

        assert_eq!(content, "hi\n");
        assert!(status.success());
        assert!(!stream.is_attached());
    }

    #[test]
    fn detach_should_reap_a_child_that_already_exited() {
        let mut stream = Stream::spawn(&mut Command::new("true"), "r").unwrap();
        assert_eq!(stream.contents().unwrap(), b"");
        let proc_dir = format!("/proc/{}", stream_child_pid(&stream));
        // end of output only means stdout closed, wait for the exit itself
        while !std::fs::read_to_string(format!("{proc_dir}/stat"))
            .unwrap()
            .contains(") Z ")
        {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        assert!(stream.detach().is_some());

        assert!(!Path::new(&proc_dir).exists());
    }

    fn stream_child_pid(stream: &Stream) -> u32 {
        stream
            .resource
            .as_ref()
            .and_then(|resource| resource.child.as_ref())
            .map(Child::id)
            .unwrap()
    }
}
