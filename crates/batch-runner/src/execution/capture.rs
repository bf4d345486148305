use std::io::{self, Read};

use os_pipe::{PipeReader, PipeWriter};

const READ_CHUNK: usize = 4096;
const TRUNCATED_NOTICE: &str = "\n[output truncated]";

pub(super) struct OutputPipe {
    reader: PipeReader,
    closed: bool,
}

pub(super) fn merged_pipe() -> io::Result<(OutputPipe, PipeWriter, PipeWriter)> {
    let (reader, writer) = os_pipe::pipe()?;
    let stderr_writer = writer.try_clone()?;
    set_nonblocking(&reader)?;
    Ok((
        OutputPipe {
            reader,
            closed: false,
        },
        writer,
        stderr_writer,
    ))
}

impl OutputPipe {
    pub(super) fn drain_into(&mut self, capture: &mut OutputCapture) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;
        while !self.closed {
            match read_available(&mut self.reader, &mut chunk)? {
                None => break,
                Some(0) => self.closed = true,
                Some(n) => {
                    capture.push(&chunk[..n]);
                    total += n;
                }
            }
        }
        Ok(total)
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(unix)]
fn set_nonblocking(reader: &PipeReader) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = reader.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// Windows anonymous pipes have no non-blocking mode; reads are guarded by a peek instead.
#[cfg(windows)]
fn set_nonblocking(_reader: &PipeReader) -> io::Result<()> {
    Ok(())
}

/// `Ok(None)` means nothing is pending right now, `Ok(Some(0))` means end of stream.
#[cfg(unix)]
fn read_available(reader: &mut PipeReader, chunk: &mut [u8]) -> io::Result<Option<usize>> {
    loop {
        match reader.read(chunk) {
            Ok(n) => return Ok(Some(n)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(windows)]
fn read_available(reader: &mut PipeReader, chunk: &mut [u8]) -> io::Result<Option<usize>> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::System::Pipes::PeekNamedPipe;

    let mut available: u32 = 0;
    let ok = unsafe {
        PeekNamedPipe(
            reader.as_raw_handle() as _,
            std::ptr::null_mut(),
            0,
            std::ptr::null_mut(),
            &mut available,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(Some(0));
        }
        return Err(err);
    }
    if available == 0 {
        return Ok(None);
    }
    let len = chunk.len().min(available as usize);
    reader.read(&mut chunk[..len]).map(Some)
}

#[derive(Debug)]
pub(super) struct OutputCapture {
    buffer: Vec<u8>,
    max_bytes: usize,
    truncated: bool,
}

impl OutputCapture {
    pub(super) fn new(max_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_bytes,
            truncated: false,
        }
    }

    pub(super) fn push(&mut self, bytes: &[u8]) {
        if self.buffer.len() < self.max_bytes {
            let remaining = self.max_bytes - self.buffer.len();
            let to_copy = remaining.min(bytes.len());
            self.buffer.extend_from_slice(&bytes[..to_copy]);
            if to_copy < bytes.len() {
                self.truncated = true;
            }
        } else if !bytes.is_empty() {
            self.truncated = true;
        }
    }

    pub(super) fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.buffer).into_owned();
        if self.truncated {
            text.push_str(TRUNCATED_NOTICE);
        }
        text
    }
}
