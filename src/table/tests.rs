use {
    super::*,
    crate::source::{MockSource, ProcessMemory},
    rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom},
    std::sync::Arc,
};

const INTERVAL: Duration = Duration::from_millis(1500);

fn pids(table: &ProcessTable) -> Vec<Pid> {
    table.snapshot().iter().map(|row| row.pid).collect()
}

fn row(pid: Pid, utilization: f64) -> ProcessRow {
    ProcessRow {
        pid,
        owner: Arc::from("root"),
        command: Arc::from("sh"),
        state: 'S',
        priority: 20,
        nice: 0,
        threads: 1,
        memory: ProcessMemory::default(),
        utilization,
        cpu_time: Duration::ZERO,
    }
}

#[test]
fn tracks_new_processes() {
    let source = MockSource::new(2, 1000);
    source.spawn(1, "/sbin/init");
    source.spawn(300, "sshd");

    let mut table = ProcessTable::new(INTERVAL);
    assert!(table.is_empty());
    table.refresh(&source, Instant::now());

    assert_eq!(table.len(), 2);
    assert!(table.contains(1));
    assert_eq!(table.get(300).map(ProcessRecord::command), Some("sshd"));
}

#[test]
fn exited_processes_leave_in_the_same_refresh() {
    let source = MockSource::new(2, 1000);
    source.spawn(1, "/sbin/init");
    source.spawn(300, "sshd");
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, start);

    source.kill(300);
    source.spawn(301, "bash");
    table.refresh(&source, start + INTERVAL);

    assert!(!table.contains(300));
    let mut tracked = pids(&table);
    tracked.sort();
    assert_eq!(tracked, vec![1, 301]);
}

#[test]
fn kernel_threads_are_skipped_until_their_pid_is_reused() {
    let source = MockSource::new(2, 1000);
    source.spawn(2, "");
    source.spawn(10, "cron");
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, start);
    assert_eq!(pids(&table), vec![10]);

    // known kernel threads are not asked for their command line again.
    let reads = source.command_reads();
    table.refresh(&source, start + INTERVAL);
    assert_eq!(source.command_reads(), reads);
    assert!(!table.contains(2));

    source.kill(2);
    table.refresh(&source, start + INTERVAL * 2);
    source.spawn(2, "a reused pid");
    table.refresh(&source, start + INTERVAL * 3);
    assert!(table.contains(2));
}

#[test]
fn failed_creation_is_retried() {
    let source = MockSource::new(1, 1000);
    source.spawn(40, "postgres");
    source.break_reads(40);
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, start);
    assert!(table.is_empty());

    source.fix_reads(40);
    table.refresh(&source, start + INTERVAL);
    assert!(table.contains(40));
}

#[test]
fn refresh_is_gated_by_interval() {
    let source = MockSource::new(1, 1000);
    source.spawn(1, "/sbin/init");
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, start);
    assert!(table.prepare(start + INTERVAL / 2).is_none());

    source.spawn(2, "bash");
    table.refresh(&source, start + INTERVAL / 2);
    assert!(!table.contains(2));

    table.refresh(&source, start + INTERVAL);
    assert!(table.contains(2));
}

#[test]
fn counts_threads_and_run_queue() {
    let source = MockSource::new(4, 1000);
    source.spawn_owned(1, "/sbin/init", 0, 1);
    source.spawn_owned(50, "firefox", 1000, 80);
    source.spawn_owned(51, "java", 1000, 41);
    source.spawn(2, "");
    source.set_running(3);

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, Instant::now());

    assert_eq!(
        table.counts(),
        TaskCounts {
            tasks: 3,
            threads: 122,
            running: 3,
        }
    );
}

#[test]
fn snapshot_is_busiest_first() {
    let source = MockSource::new(1, 1000);
    for pid in [10, 11, 12, 13] {
        source.spawn(pid, "worker");
    }
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, start);

    source.set_total(2000);
    source.set_ticks(10, 100, 0);
    source.set_ticks(11, 50, 50);
    source.set_ticks(12, 200, 100);
    table.refresh(&source, start + INTERVAL);

    let snapshot = table.snapshot();
    assert_eq!(
        snapshot.iter().map(|r| r.pid).collect::<Vec<_>>(),
        vec![12, 10, 11, 13]
    );
    assert!((snapshot[0].utilization - 30.0).abs() < 1e-9);
    assert_eq!(snapshot[3].utilization, 0.0);

    // the order is stable across calls.
    assert_eq!(table.snapshot(), snapshot);
}

#[test]
fn near_ties_are_ordered_by_pid() {
    let rows = vec![
        row(30, 5.0),
        row(20, 5.0001),
        row(10, 4.9999),
        row(40, 7.5),
        row(5, 0.0),
    ];
    let rows = order_rows(rows);

    assert_eq!(
        rows.iter().map(|r| r.pid).collect::<Vec<_>>(),
        vec![40, 10, 20, 30, 5]
    );
}

#[test]
fn near_ties_on_either_side_of_a_rounding_edge_are_ordered_by_pid() {
    let rows = order_rows(vec![row(3, 0.0004), row(5, 0.0006)]);
    assert_eq!(rows.iter().map(|r| r.pid).collect::<Vec<_>>(), vec![3, 5]);

    let rows = order_rows(vec![row(8, 2.0494), row(2, 2.0502), row(9, 1.0)]);
    assert_eq!(rows.iter().map(|r| r.pid).collect::<Vec<_>>(), vec![2, 8, 9]);
}

#[test]
fn chained_near_ties_keep_every_neighbour_in_order() {
    // 1 and 2 are far apart, but each is tied with 9.
    let rows = order_rows(vec![row(1, 0.0015), row(9, 0.0008), row(2, 0.0001)]);
    assert_adjacent_pairs_ordered(&rows);
}

#[test]
fn ordering_holds_for_every_neighbour() {
    let mut rng = StdRng::seed_from_u64(0x7ac4);

    for round in 0..200 {
        let len = rng.gen_range(0..64);
        let mut rows = (0..len)
            .map(|pid| {
                let utilization = match round % 3 {
                    // clustered around a few values, straddling rounding edges.
                    0 => f64::from(rng.gen_range(0..4u32)) * 1e-3 + rng.gen_range(-6e-4..6e-4),
                    // dense within a couple of tolerances.
                    1 => rng.gen_range(0.0..3e-3),
                    _ => rng.gen_range(0.0..400.0),
                };
                row(pid, utilization.max(0.0))
            })
            .collect::<Vec<_>>();

        let ordered = order_rows(rows.clone());
        assert_eq!(ordered.len(), rows.len());
        assert_adjacent_pairs_ordered(&ordered);

        // the result does not depend on the order the rows arrive in.
        rows.shuffle(&mut rng);
        assert_eq!(order_rows(rows), ordered);
    }
}

fn assert_adjacent_pairs_ordered(rows: &[ProcessRow]) {
    for pair in rows.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if (a.utilization - b.utilization).abs() < TIE_TOLERANCE {
            assert!(a.pid < b.pid, "tied {a:?} before {b:?}");
        } else {
            assert!(a.utilization > b.utilization, "{a:?} before {b:?}");
        }
    }
}

#[test]
fn snapshot_is_independent_of_the_table() {
    let source = MockSource::new(1, 1000);
    source.spawn(10, "cc");
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, start);
    let before = table.snapshot();

    source.kill(10);
    table.refresh(&source, start + INTERVAL);
    assert!(table.is_empty());
    assert_eq!(before.len(), 1);
    assert_eq!(&*before[0].command, "cc");
}

#[test]
fn staged_refresh_matches_a_direct_one() {
    let source = MockSource::new(1, 1000);
    source.spawn(1, "/sbin/init");
    source.spawn(2, "bash");
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    let plan = table.prepare(start).unwrap();
    let reconciliation = plan.collect(&source);
    assert!(table.is_empty());

    table.apply(reconciliation);
    assert_eq!(table.len(), 2);
    assert!(table.prepare(start).is_none());
}

#[test]
fn stale_plans_do_not_duplicate_or_resurrect() {
    let source = MockSource::new(1, 1000);
    source.spawn(1, "/sbin/init");
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    let stale = table.prepare(start).unwrap();

    // another refresh lands between the stale plan's preparation and its application.
    table.refresh(&source, start);
    assert_eq!(table.len(), 1);

    let reconciliation = stale.collect(&source);
    table.apply(reconciliation);
    assert_eq!(table.len(), 1);

    // records collected before a process exited do not outlive it.
    source.spawn(7, "sleep 1");
    let plan = table.prepare(start + INTERVAL).unwrap();
    let reconciliation = plan.collect(&source);
    source.kill(7);
    table.refresh(&source, start + INTERVAL);
    assert!(!table.contains(7));

    table.apply(reconciliation);
    assert!(!table.contains(7));
    assert_eq!(table.len(), 1);
}

#[test]
fn failed_listing_changes_nothing() {
    let source = MockSource::new(1, 1000);
    source.spawn(1, "/sbin/init");
    source.set_running(1);
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    table.refresh(&source, start);

    source.break_listing();
    source.kill(1);
    source.set_running(9);
    table.refresh(&source, start + INTERVAL);
    assert!(table.contains(1));
    assert_eq!(table.counts().running, 1);

    source.fix_listing();
    table.refresh(&source, start + INTERVAL * 2);
    assert!(!table.contains(1));
    assert_eq!(table.counts().running, 9);
}

#[test]
fn failed_listing_is_retried_after_an_interval() {
    let source = MockSource::new(1, 1000);
    source.spawn(1, "/sbin/init");
    let start = Instant::now();

    let mut table = ProcessTable::new(INTERVAL);
    source.break_listing();
    table.refresh(&source, start);
    assert!(table.is_empty());

    // the failed attempt holds off the next one like any other refresh.
    source.fix_listing();
    assert!(table.prepare(start).is_none());
    assert!(table.prepare(start + INTERVAL / 2).is_none());
    table.refresh(&source, start + INTERVAL / 2);
    assert!(table.is_empty());

    table.refresh(&source, start + INTERVAL);
    assert!(table.contains(1));
}
