use nexa_timers::{
    Callback, CallbackError, ManualClock, ManualTimer, MonotonicClock, TimeoutManager, TimerConfig, TimerOptions,
    call_directly,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

type Log = Rc<RefCell<Vec<&'static str>>>;

fn setup() -> (Rc<TimeoutManager<Callback>>, Rc<ManualClock>, Rc<ManualTimer>) {
    let clock = Rc::new(ManualClock::new());
    let timer = Rc::new(ManualTimer::new());
    let manager = TimeoutManager::new(
        TimerConfig::default(),
        clock.clone(),
        timer.clone(),
        call_directly,
    );
    (manager, clock, timer)
}

fn record(log: &Log, tag: &'static str) -> Callback {
    let log = log.clone();
    Box::new(move || {
        log.borrow_mut().push(tag);
        Ok(())
    })
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_fires_in_deadline_order() {
    let (manager, clock, _timer) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    manager.set(ms(30), TimerOptions::timeout(), record(&log, "30")).unwrap();
    manager.set(ms(10), TimerOptions::timeout(), record(&log, "10a")).unwrap();
    manager.set(ms(20), TimerOptions::timeout(), record(&log, "20")).unwrap();
    manager.set(ms(10), TimerOptions::timeout(), record(&log, "10b")).unwrap();
    manager.set(ms(0), TimerOptions::timeout(), record(&log, "0")).unwrap();

    manager.run_expired(clock.now() + ms(30));

    assert_eq!(*log.borrow(), vec!["0", "10a", "10b", "20", "30"]);
    assert!(manager.is_empty());
}

#[test]
fn test_zero_delay_pair_fires_first_registered_first() {
    let (manager, clock, _timer) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    manager.set(ms(0), TimerOptions::timeout(), record(&log, "first")).unwrap();
    manager.set(ms(0), TimerOptions::timeout(), record(&log, "second")).unwrap();
    manager.run_expired(clock.now());

    assert_eq!(*log.borrow(), vec!["first", "second"]);
}

#[test]
fn test_only_due_entries_fire() {
    let (manager, clock, timer) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    manager.set(ms(5), TimerOptions::timeout(), record(&log, "early")).unwrap();
    manager.set(ms(50), TimerOptions::timeout(), record(&log, "late")).unwrap();

    clock.advance(ms(5));
    manager.run_expired_now();

    assert_eq!(*log.borrow(), vec!["early"]);
    assert_eq!(manager.len(), 1);
    assert_eq!(timer.armed_delay(), Some(ms(45)));
}

#[test]
fn test_clear_before_deadline_never_fires() {
    let (manager, clock, timer) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let id = manager.set(ms(5), TimerOptions::timeout(), record(&log, "cleared")).unwrap();
    manager.clear(id);
    assert!(!timer.is_armed());

    manager.run_expired(clock.now() + ms(100));
    assert!(log.borrow().is_empty());
    assert_eq!(manager.stats().cleared_count, 1);
}

#[test]
fn test_clear_after_fire_is_noop() {
    let (manager, clock, _timer) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let id = manager.set(ms(1), TimerOptions::timeout(), record(&log, "once")).unwrap();
    manager.run_expired(clock.now() + ms(1));
    manager.clear(id);
    manager.clear(id);

    assert_eq!(*log.borrow(), vec!["once"]);
    assert_eq!(manager.stats().cleared_count, 0);
}

#[test]
fn test_ids_are_never_reused() {
    let (manager, clock, _timer) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let first = manager.set(ms(0), TimerOptions::timeout(), record(&log, "a")).unwrap();
    manager.run_expired(clock.now());
    let second = manager.set(ms(0), TimerOptions::timeout(), record(&log, "b")).unwrap();

    assert!(second.value() > first.value());
}

#[test]
fn test_interval_fires_every_period_until_cleared() {
    let (manager, clock, timer) = setup();
    let start = clock.now();
    let fired_at: Rc<RefCell<Vec<Instant>>> = Rc::new(RefCell::new(Vec::new()));

    let id = {
        let fired_at = fired_at.clone();
        let clock = clock.clone();
        manager
            .set(
                ms(10),
                TimerOptions::interval(),
                Box::new(move || {
                    fired_at.borrow_mut().push(clock.now());
                    Ok(())
                }),
            )
            .unwrap()
    };

    for _ in 0..5 {
        let delay = timer.armed_delay().unwrap();
        clock.advance(delay);
        assert!(timer.fire());
    }

    {
        let fired_at = fired_at.borrow();
        assert_eq!(fired_at.len(), 5);
        for (n, at) in fired_at.iter().enumerate() {
            assert!(*at >= start + ms(10) * (n as u32 + 1));
        }
    }

    manager.clear(id);
    assert!(!timer.is_armed());
    manager.run_expired(clock.now() + ms(1000));
    assert_eq!(fired_at.borrow().len(), 5);
}

#[test]
fn test_failed_callback_does_not_abort_pass() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (manager, clock, _timer) = setup();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    {
        let log = log.clone();
        manager
            .set(
                ms(4),
                TimerOptions::interval(),
                Box::new(move || {
                    log.borrow_mut().push("failing");
                    Err(CallbackError::new("script threw"))
                }),
            )
            .unwrap();
    }
    manager.set(ms(4), TimerOptions::timeout(), record(&log, "after")).unwrap();

    manager.run_expired(clock.now() + ms(4));

    assert_eq!(*log.borrow(), vec!["failing", "after"]);
    assert_eq!(manager.stats().failed_count, 1);
    // The failing interval is still scheduled.
    assert_eq!(manager.len(), 1);
}
