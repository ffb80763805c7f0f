mod common;

use common::{job, Harness, HarnessOptions, Script};
use menu_render_service::error::RenderError;
use menu_render_service::models::PageFormat;
use menu_render_service::renderers::ExportTimeouts;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

#[tokio::test]
async fn arabic_menu_renders_valid_pdf() {
    let harness = Harness::new();

    let result = harness.renderer.render(&job("ar")).await.unwrap();

    assert!(result.is_validated());
    assert!(result.byte_length() > 1000);
    assert!(result.pdf_bytes().starts_with(b"%PDF-"));
    assert_eq!(Script::count(&harness.script.launches), 1);

    let html = harness.script.last_html().unwrap();
    assert!(html.contains(r#"dir="rtl""#));
    assert!(html.contains(r#"<base href="https://assets.menu-render.local/">"#));
    assert_eq!(Script::count(&harness.script.interceptors_attached), 1);
}

#[tokio::test]
async fn concurrent_jobs_share_one_browser() {
    let harness = Harness::new();
    harness.script.launch_delay_ms.store(50, Ordering::SeqCst);

    let job = job("en");
    let (first, second) = tokio::join!(
        harness.renderer.render(&job),
        harness.renderer.render(&job)
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(Script::count(&harness.script.launch_calls), 1);
    assert_eq!(harness.renderer.browsers().launch_count(), 1);
}

#[tokio::test]
async fn export_failure_retries_once_on_fresh_browser() {
    let harness = Harness::new();
    harness.script.fail_exports.store(1, Ordering::SeqCst);

    let result = harness.renderer.render(&job("en")).await;

    assert!(result.is_ok());
    assert_eq!(Script::count(&harness.script.prints), 2);
    assert_eq!(Script::count(&harness.script.launches), 2);
    assert_eq!(Script::count(&harness.script.sessions_closed), 1);
    assert_eq!(harness.renderer.browsers().teardown_count(), 1);
}

#[tokio::test]
async fn unprintable_menu_is_rejected_before_launch() {
    let harness = Harness::new();
    let mut job = job("en");
    for item in &mut job.categories[0].items {
        item.available = false;
    }

    let err = harness.renderer.render(&job).await.unwrap_err();

    assert!(matches!(err, RenderError::InvalidInput(_)));
    assert!(!err.is_retryable());
    assert_eq!(Script::count(&harness.script.launch_calls), 0);
    assert_eq!(harness.renderer.browsers().teardown_count(), 0);
}

#[tokio::test]
async fn hanging_network_idle_does_not_block_export() {
    let harness = Harness::new();
    harness.script.hang_network_idle.store(true, Ordering::SeqCst);

    let started = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(5), harness.renderer.render(&job("en")))
        .await
        .expect("render must be bounded");

    assert!(result.is_ok());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(Script::count(&harness.script.launches), 1);
}

#[tokio::test]
async fn hanging_export_exhausts_as_retryable_timeout() {
    let harness = Harness::with_options(HarnessOptions {
        max_attempts: 2,
        timeouts: ExportTimeouts {
            navigation: Duration::from_millis(200),
            fonts: Duration::from_millis(50),
            network_idle: Duration::from_millis(50),
            export: Duration::from_millis(100),
        },
        ..HarnessOptions::default()
    });
    harness.script.hang_export.store(true, Ordering::SeqCst);

    let err = tokio::time::timeout(Duration::from_secs(5), harness.renderer.render(&job("en")))
        .await
        .expect("render must be bounded")
        .unwrap_err();

    match &err {
        RenderError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, 2);
            assert!(matches!(**last, RenderError::ExportTimeout { timeout_ms: 100 }));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert!(err.is_timeout());
    assert!(err.is_retryable());
    assert_eq!(Script::count(&harness.script.launches), 2);
    assert_eq!(
        Script::count(&harness.script.pages_opened),
        Script::count(&harness.script.pages_closed)
    );
}

#[tokio::test]
async fn hanging_navigation_exhausts_as_retryable_timeout() {
    let harness = Harness::with_options(HarnessOptions {
        max_attempts: 2,
        timeouts: ExportTimeouts {
            navigation: Duration::from_millis(100),
            fonts: Duration::from_millis(50),
            network_idle: Duration::from_millis(50),
            export: Duration::from_millis(200),
        },
        ..HarnessOptions::default()
    });
    harness.script.hang_navigation.store(true, Ordering::SeqCst);

    let err = tokio::time::timeout(Duration::from_secs(5), harness.renderer.render(&job("en")))
        .await
        .expect("render must be bounded")
        .unwrap_err();

    match &err {
        RenderError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, 2);
            assert!(matches!(**last, RenderError::NavigationTimeout { timeout_ms: 100 }));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert!(err.is_timeout());
    assert!(err.is_retryable());
    assert_eq!(Script::count(&harness.script.prints), 0);
    assert_eq!(Script::count(&harness.script.pages_opened), 2);
    assert_eq!(
        Script::count(&harness.script.pages_opened),
        Script::count(&harness.script.pages_closed)
    );
}

#[tokio::test]
async fn hanging_fonts_print_with_fallbacks() {
    let harness = Harness::with_options(HarnessOptions {
        timeouts: ExportTimeouts {
            navigation: Duration::from_millis(500),
            fonts: Duration::from_millis(50),
            network_idle: Duration::from_millis(100),
            export: Duration::from_millis(500),
        },
        ..HarnessOptions::default()
    });
    harness.script.hang_fonts.store(true, Ordering::SeqCst);

    let started = Instant::now();
    let pdf = harness
        .renderer
        .render(&job("ar"))
        .await
        .expect("font timeout is not fatal");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(pdf.pdf_bytes().starts_with(b"%PDF-"));
    assert_eq!(Script::count(&harness.script.prints), 1);
    assert_eq!(Script::count(&harness.script.launches), 1);
    assert_eq!(Script::count(&harness.script.pages_closed), 1);
}

#[tokio::test]
async fn abandoned_render_still_closes_its_page() {
    let harness = Harness::with_options(HarnessOptions {
        timeouts: ExportTimeouts {
            navigation: Duration::from_millis(500),
            fonts: Duration::from_millis(200),
            network_idle: Duration::from_secs(2),
            export: Duration::from_millis(500),
        },
        ..HarnessOptions::default()
    });
    harness.script.hang_network_idle.store(true, Ordering::SeqCst);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(30), harness.renderer.render(&job("en"))).await;
    assert!(abandoned.is_err(), "caller deadline should fire first");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(Script::count(&harness.script.pages_opened), 1);
    assert_eq!(Script::count(&harness.script.pages_closed), 1);

    harness.script.hang_network_idle.store(false, Ordering::SeqCst);
    harness
        .renderer
        .render(&job("en"))
        .await
        .expect("render after abandonment");

    assert_eq!(Script::count(&harness.script.launches), 1);
    assert_eq!(Script::count(&harness.script.contexts_created), 1);
    assert_eq!(
        Script::count(&harness.script.pages_opened),
        Script::count(&harness.script.pages_closed)
    );
}

#[tokio::test]
async fn launch_failures_surface_after_bounded_attempts() {
    let harness = Harness::with_options(HarnessOptions {
        launch_attempts: 2,
        max_attempts: 2,
        ..HarnessOptions::default()
    });
    harness.script.fail_launches.store(100, Ordering::SeqCst);

    let err = harness.renderer.render(&job("en")).await.unwrap_err();

    match &err {
        RenderError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, 2);
            assert!(matches!(
                **last,
                RenderError::BrowserLaunchFailed { attempts: 2, .. }
            ));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert_eq!(err.to_error_response().error_type, "exhausted");
    assert_eq!(Script::count(&harness.script.launch_calls), 4);
}

#[tokio::test]
async fn sequential_renders_reuse_browser_and_context() {
    let harness = Harness::new();
    let job = job("en");

    harness.renderer.render(&job).await.unwrap();
    let first_html = harness.script.last_html().unwrap();
    harness.renderer.render(&job).await.unwrap();

    assert_eq!(Script::count(&harness.script.launches), 1);
    assert_eq!(Script::count(&harness.script.contexts_created), 1);
    assert_eq!(harness.script.last_html().unwrap(), first_html);
    assert_eq!(
        Script::count(&harness.script.pages_opened),
        Script::count(&harness.script.pages_closed)
    );
}

#[tokio::test]
async fn page_formats_get_their_own_context() {
    let harness = Harness::new();
    let a4 = job("en");
    let mut letter = job("en");
    letter.page_format = PageFormat::Letter;

    harness.renderer.render(&a4).await.unwrap();
    harness.renderer.render(&letter).await.unwrap();

    assert_eq!(Script::count(&harness.script.contexts_created), 2);
    let options = harness.script.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.paper_width, 8.5);
    assert_eq!(options.paper_height, 11.0);
    assert!(options.print_background);
}

#[tokio::test]
async fn crashed_browser_is_relaunched() {
    let harness = Harness::new();
    let job = job("en");

    harness.renderer.render(&job).await.unwrap();
    harness.script.crash_browsers();
    harness.renderer.render(&job).await.unwrap();

    assert_eq!(Script::count(&harness.script.launches), 2);
    assert_eq!(Script::count(&harness.script.sessions_closed), 1);
    assert_eq!(harness.renderer.browsers().teardown_count(), 0);
}

#[tokio::test]
async fn malformed_output_is_retried_once() {
    let harness = Harness::with_options(HarnessOptions {
        max_attempts: 5,
        ..HarnessOptions::default()
    });
    harness.script.invalid_outputs.store(10, Ordering::SeqCst);

    let err = harness.renderer.render(&job("en")).await.unwrap_err();

    assert_eq!(Script::count(&harness.script.prints), 2);
    assert!(matches!(
        err,
        RenderError::Exhausted { attempts: 2, ref last } if matches!(**last, RenderError::InvalidOutput(_))
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn health_reflects_browser_state() {
    let harness = Harness::new();

    let before = harness.renderer.health().await;
    assert!(!before.healthy);

    harness.renderer.render(&job("en")).await.unwrap();
    let after = harness.renderer.health().await;
    assert!(after.healthy);
    assert!(after.details.contains("generation 1"));

    harness.renderer.reset().await;
    assert!(!harness.renderer.health().await.healthy);
    assert_eq!(Script::count(&harness.script.sessions_closed), 1);
}
