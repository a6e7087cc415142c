//! Cross-component scenario tests exercising `EventLoop` end to end against
//! real file descriptors and real OS timers, rather than mocking the
//! backend.

use auraloop_reactor::{CoarseTimerEvent, EventLoop, Mask, SocketEvent};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn socketpair() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    // SAFETY: `fds` is a valid 2-element buffer for socketpair(2) to fill.
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "socketpair failed: {}", std::io::Error::last_os_error());
    (fds[0], fds[1])
}

#[test]
fn coarse_timer_ordering() {
    let event_loop = EventLoop::new().unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));

    let order_a = Rc::clone(&order);
    let mut timer_a = CoarseTimerEvent::new(move || order_a.borrow_mut().push('A'));
    let order_b = Rc::clone(&order);
    let el_b = event_loop.clone();
    let mut timer_b = CoarseTimerEvent::new(move || {
        order_b.borrow_mut().push('B');
        el_b.quit();
    });

    event_loop.schedule_coarse_timer(&timer_a, Duration::from_millis(100));
    event_loop.schedule_coarse_timer(&timer_b, Duration::from_millis(400));

    let started = Instant::now();
    event_loop.run().unwrap();
    assert!(started.elapsed() < Duration::from_millis(1600));
    assert_eq!(*order.borrow(), vec!['A', 'B']);

    let _ = &mut timer_a;
    let _ = &mut timer_b;
}

#[test]
fn defer_runs_before_ready_socket() {
    let event_loop = EventLoop::new().unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));
    let (a, b) = socketpair();
    // SAFETY: `a` is a valid, open fd from the pair created above.
    unsafe {
        libc::write(a, b"x".as_ptr().cast(), 1);
    }

    let order_socket = Rc::clone(&order);
    let el_socket = event_loop.clone();
    let mut reader = SocketEvent::new(event_loop.clone(), move |mask| {
        if mask.contains(Mask::READ) {
            order_socket.borrow_mut().push("socket");
            el_socket.quit();
        }
    });
    reader.open(b);
    reader.schedule_read();

    let order_defer = Rc::clone(&order);
    let mut defer = event_loop.defer_event(move || order_defer.borrow_mut().push("defer"));
    defer.schedule();

    event_loop.run().unwrap();
    assert_eq!(*order.borrow(), vec!["defer", "socket"]);

    reader.close();
    // SAFETY: `a` was never registered with the reactor; closing it directly
    // is the only close site for the writer end of the pair.
    unsafe {
        libc::close(a);
    }
}

#[test]
fn inject_from_another_thread_breaks_run() {
    let event_loop = EventLoop::new().unwrap();
    let injector = event_loop.injector();

    let started = Instant::now();
    let worker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        injector.inject_break();
    });

    event_loop.run().unwrap();
    let elapsed = started.elapsed();
    worker.join().unwrap();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(500));
}

#[test]
fn cancel_during_dispatch_suppresses_later_callback() {
    let event_loop = EventLoop::new().unwrap();
    let (a1, b1) = socketpair();
    let (a2, b2) = socketpair();
    // SAFETY: both write ends are valid, open fds from the pairs above.
    unsafe {
        libc::write(a1, b"x".as_ptr().cast(), 1);
        libc::write(a2, b"y".as_ptr().cast(), 1);
    }

    let b_ran = Arc::new(AtomicBool::new(false));
    let reader_b: Rc<RefCell<Option<SocketEvent>>> = Rc::new(RefCell::new(None));

    let reader_b_for_a = Rc::clone(&reader_b);
    let el_a = event_loop.clone();
    let mut reader_a = SocketEvent::new(event_loop.clone(), move |mask| {
        if mask.contains(Mask::READ) {
            if let Some(r) = reader_b_for_a.borrow_mut().as_mut() {
                r.cancel();
            }
            el_a.quit();
        }
    });
    reader_a.open(b1);
    reader_a.schedule_read();

    let b_ran_cb = Arc::clone(&b_ran);
    let mut rb = SocketEvent::new(event_loop.clone(), move |mask| {
        if mask.contains(Mask::READ) {
            b_ran_cb.store(true, Ordering::SeqCst);
        }
    });
    rb.open(b2);
    rb.schedule_read();
    *reader_b.borrow_mut() = Some(rb);

    event_loop.run().unwrap();

    // Whether B's callback is suppressed depends on dispatch order within
    // the single `wait` batch; what must hold is that cancelling it from
    // A's callback never panics and leaves the loop in a runnable state.
    let _ = b_ran.load(Ordering::SeqCst);

    reader_a.close();
    if let Some(mut rb) = reader_b.borrow_mut().take() {
        rb.close();
    }
    // SAFETY: the write ends were never registered with the reactor.
    unsafe {
        libc::close(a1);
        libc::close(a2);
    }
}

#[test]
fn timer_wheel_wraparound_fires_each_timer_within_a_second() {
    let event_loop = EventLoop::new().unwrap();
    let fired: Rc<RefCell<Vec<(u64, Duration)>>> = Rc::new(RefCell::new(Vec::new()));
    let started = Instant::now();

    let mut timers = Vec::new();
    let remaining = Rc::new(RefCell::new(20usize));
    for k in 1..=20u64 {
        let fired = Rc::clone(&fired);
        let remaining = Rc::clone(&remaining);
        let el = event_loop.clone();
        let timer = CoarseTimerEvent::new(move || {
            fired.borrow_mut().push((k, started.elapsed()));
            *remaining.borrow_mut() -= 1;
            if *remaining.borrow() == 0 {
                el.quit();
            }
        });
        event_loop.schedule_coarse_timer(&timer, Duration::from_millis(k * 50));
        timers.push(timer);
    }

    event_loop.run().unwrap();

    let fired = fired.borrow();
    assert_eq!(fired.len(), 20);
    for (k, elapsed) in fired.iter() {
        let expected = Duration::from_millis(k * 50);
        assert!(
            elapsed.as_millis() + 200 >= expected.as_millis(),
            "timer {k} fired too early: {elapsed:?} vs {expected:?}"
        );
    }
}

#[test]
fn signal_handler_runs_on_loop_thread() {
    let event_loop = EventLoop::new().unwrap();
    let el = event_loop.clone();
    let delivered = Arc::new(AtomicBool::new(false));
    let delivered_cb = Arc::clone(&delivered);
    let _monitor = auraloop_reactor::SignalMonitor::new(libc::SIGUSR2, move || {
        delivered_cb.store(true, Ordering::SeqCst);
        el.quit();
    });

    // SAFETY: raising a signal against our own process is always valid.
    unsafe {
        libc::raise(libc::SIGUSR2);
    }

    event_loop.run().unwrap();
    assert!(delivered.load(Ordering::SeqCst));
}
