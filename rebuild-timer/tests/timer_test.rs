// Process-wide timer. Kept to a single test: the instance is global.

use std::sync::Arc;

use rebuild_timer::{logging, timer, EnvConfig, POOL_SIZE_KEY};

#[test]
fn test_global_timer_lifecycle() {
    logging::init_test();

    let var = EnvConfig::new().var_name(POOL_SIZE_KEY);
    assert_eq!(var, "REBUILD_TIMER_DGC_THREAD_POOL_SIZE");
    std::env::set_var(&var, "2");

    assert!(!rebuild_timer::shutdown());

    let pool = rebuild_timer::get().unwrap();
    assert_eq!(pool.capacity(), 2);
    assert!(Arc::ptr_eq(&pool, &rebuild_timer::get().unwrap()));
    assert!(timer::instance().is_active());
    assert!(pool.thread_name_prefix().starts_with("dependency-graph-rebuild-timer"));

    assert!(pool.execute(|| Ok(())).unwrap().wait().is_completed());

    assert!(rebuild_timer::shutdown());
    assert!(!rebuild_timer::shutdown());
    assert!(pool.is_shutdown());

    let next = rebuild_timer::get().unwrap();
    assert!(!Arc::ptr_eq(&pool, &next));
    assert!(rebuild_timer::shutdown());

    std::env::remove_var(&var);
}
