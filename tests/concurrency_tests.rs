//! Concurrency tests: one lock per template instance, parallel clones

use std::sync::Arc;
use std::thread;

use velour::{Context, Template, Value};

const THREADS: usize = 8;
const ITERATIONS: usize = 50;

#[test]
fn test_concurrent_exec_on_shared_template() {
    let template = Arc::new(Template::new("<%= name %>:<%= n * 2 %>").unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let template = Arc::clone(&template);
            thread::spawn(move || {
                let mut ctx = Context::new();
                ctx.set("name", format!("t{}", i));
                ctx.set("n", i as i64);
                for _ in 0..ITERATIONS {
                    // Every render must reflect only this thread's
                    // bindings and arrive fully formed
                    let out = template.exec(&ctx).unwrap();
                    assert_eq!(out, format!("t{}:{}", i, i * 2));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_first_exec_parses_once_safely() {
    // Lazy construction, so the racing threads all contend on the
    // initial parse; the lock serializes it
    let template = Arc::new(Template::lazy("<%= 40 + 2 %>"));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let template = Arc::clone(&template);
            thread::spawn(move || {
                let out = template.exec(&Context::new()).unwrap();
                assert_eq!(out, "42");
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(template.is_parsed());
}

#[test]
fn test_clones_render_in_parallel() {
    let original = Template::new("<%= tag() %>#<%= i %>").unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let mut clone = original.clone();
            let label = format!("c{}", i);
            let tag = label.clone();
            clone
                .helpers
                .add("tag", move |_: &[Value]| Ok(Value::from(tag.clone())));
            thread::spawn(move || {
                let mut ctx = Context::new();
                ctx.set("i", i as i64);
                for _ in 0..ITERATIONS {
                    let out = clone.exec(&ctx).unwrap();
                    assert_eq!(out, format!("{}#{}", label, i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_errors_stay_scoped_to_their_call() {
    // Half the threads render successfully, half hit an evaluation
    // error; neither outcome disturbs the other
    let template = Arc::new(Template::new("<%= maybe %>").unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let template = Arc::clone(&template);
            thread::spawn(move || {
                let mut ctx = Context::new();
                if i % 2 == 0 {
                    ctx.set("maybe", i as i64);
                }
                for _ in 0..ITERATIONS {
                    let result = template.exec(&ctx);
                    if i % 2 == 0 {
                        assert_eq!(result.unwrap(), i.to_string());
                    } else {
                        assert!(result.is_err());
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
