use std::rc::Rc;

use assert_call::{call, CallRecorder};

use crate::{core::Runtime, effect, State};

#[test]
fn update_reads_latest_value() {
    let mut rt = Runtime::new();
    let s = State::new(vec![1]);
    s.update(
        |prev| {
            let mut next = prev.clone();
            next.push(2);
            next
        },
        rt.ac(),
    );
    s.update(
        |prev| {
            let mut next = prev.clone();
            next.push(3);
            next
        },
        rt.ac(),
    );
    assert_eq!(s.get(&mut rt.sc()), [1, 2, 3]);
}

#[test]
fn update_installs_new_sequence() {
    let mut rt = Runtime::new();
    let s: State<Rc<[u32]>> = State::new(Rc::from([1, 2]));
    let before = s.get(&mut rt.sc());
    s.update(|prev| prev.iter().map(|x| x * 10).collect(), rt.ac());
    let after = s.get(&mut rt.sc());

    assert_eq!(*before, [1, 2]);
    assert_eq!(*after, [10, 20]);
    assert!(!Rc::ptr_eq(&before, &after));
}

#[test]
fn update_notifies_effect_once_per_run() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = State::new(0);
    let s0 = s.clone();
    let _e = effect(move |sc| {
        call!("{}", s0.get(sc));
    });
    rt.update();
    cr.verify("0");

    s.update(|x| x + 1, rt.ac());
    s.update(|x| x + 1, rt.ac());
    cr.verify(());
    rt.update();
    cr.verify("2");
}

#[test]
fn set_dedup_skips_equal_value() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = State::new(String::from("a"));
    let s0 = s.clone();
    let _e = effect(move |sc| {
        call!("{}", s0.get(sc));
    });
    rt.update();
    cr.verify("a");

    s.set_dedup("a".into(), rt.ac());
    rt.update();
    cr.verify(());

    s.set("a".into(), rt.ac());
    rt.update();
    cr.verify("a");

    s.set_dedup("b".into(), rt.ac());
    rt.update();
    cr.verify("b");
}

#[test]
fn effect_tracks_only_states_read_last_run() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let flag = State::new(true);
    let a = State::new(1);
    let b = State::new(2);
    let (flag0, a0, b0) = (flag.clone(), a.clone(), b.clone());
    let _e = effect(move |sc| {
        let value = if flag0.get(sc) { a0.get(sc) } else { b0.get(sc) };
        call!("{}", value);
    });
    rt.update();
    cr.verify("1");

    b.set(20, rt.ac());
    rt.update();
    cr.verify(());

    flag.set(false, rt.ac());
    rt.update();
    cr.verify("20");

    a.set(10, rt.ac());
    rt.update();
    cr.verify(());
}

#[test]
fn borrow_untracked_does_not_subscribe() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = State::new(1);
    let s0 = s.clone();
    let _e = effect(move |_| {
        call!("{}", *s0.borrow_untracked());
    });
    rt.update();
    cr.verify("1");

    s.set(2, rt.ac());
    rt.update();
    cr.verify(());
}

#[test]
fn debug() {
    let s = State::new(vec![1, 2]);
    assert_eq!(format!("{s:?}"), "[1, 2]");
}
