//! Drives a connected Unix-domain socket pair through `SocketEvent`: one
//! end writes a message, the other schedules a read and echoes it back,
//! showing `schedule_read`/`schedule_write` and the readiness-mask
//! callback argument.

use auraloop_demo::tracing_init;
use auraloop_reactor::{EventLoop, Mask, SocketEvent};
use std::os::unix::io::RawFd;

fn socketpair() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    // SAFETY: `fds` is a valid 2-element buffer for socketpair(2) to fill.
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "socketpair failed: {}", std::io::Error::last_os_error());
    (fds[0], fds[1])
}

fn main() {
    tracing_init::init_tracing();
    let event_loop = EventLoop::new().expect("failed to construct event loop");
    let (a, b) = socketpair();

    let el_reader = event_loop.clone();
    let mut reader = SocketEvent::new(event_loop.clone(), move |mask| {
        if !mask.contains(Mask::READ) {
            return;
        }
        let mut buf = [0u8; 64];
        // SAFETY: `buf` is a valid buffer; `b` is open for the duration of
        // this closure's registration.
        let n = unsafe { libc::read(b, buf.as_mut_ptr().cast(), buf.len()) };
        if n > 0 {
            let msg = String::from_utf8_lossy(&buf[..n as usize]);
            tracing::info!(%msg, "socket reader received message");
        }
        el_reader.quit();
    });
    reader.open(b);
    reader.schedule_read();

    let mut writer = SocketEvent::new(event_loop.clone(), |_mask| {});
    writer.open(a);
    writer.schedule_write();
    let message = b"hello from auraloop\0";
    // SAFETY: `message` is a valid buffer; `a` is the writable end of the
    // pair created above.
    unsafe {
        libc::write(a, message.as_ptr().cast(), message.len());
    }

    tracing::info!("running: expect the reader to log the written message");
    event_loop.run().expect("event loop run failed");

    reader.close();
    writer.close();
}
