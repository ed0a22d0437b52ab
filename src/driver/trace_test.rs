use super::*;

#[test]
fn test_entries_are_recorded_in_order() {
    let trace = Trace::new();
    trace.add("Init Leader");
    trace.add("PrepareAndStart");

    let entries = trace.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "Init Leader");
    assert!(entries[0].elapsed <= entries[1].elapsed);
    assert!(trace.contains("Prepare"));
    assert!(!trace.contains("Apply"));
}

#[test]
fn test_dump_is_bounded() {
    let trace = Trace::new();
    for i in 0..200 {
        trace.add(format!("step {i}"));
    }

    assert_eq!(trace.entries().len(), 128);
    let dump = trace.dump();
    assert!(dump.contains("step 0"));
    assert!(!dump.contains("step 150"));
    assert!(dump.contains("(72 entries dropped)"));
}

#[test]
fn test_concurrent_adds_account_every_entry() {
    let trace = Trace::new();
    std::thread::scope(|s| {
        for t in 0..4 {
            let trace = &trace;
            s.spawn(move || {
                for i in 0..100 {
                    trace.add(format!("thread {t} step {i}"));
                }
            });
        }
    });

    assert_eq!(trace.entries().len(), 128);
    assert!(trace.dump().contains("(272 entries dropped)"));
}
