use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use pullcache_service::config::Config;

use crate::workloads::{Outcome, WorkloadsConfig, prepare_workload, process_workload};

pub async fn perform_stresstest(
    service_config: Config,
    workloads: WorkloadsConfig,
    duration: Duration,
) -> Result<()> {
    // initialize workloads
    let workloads: Vec<_> = workloads
        .workloads
        .iter()
        .enumerate()
        .map(|(i, workload)| {
            let prepared = prepare_workload(i, &service_config, workload);
            (workload.concurrency.max(1), Arc::new(prepared))
        })
        .collect();

    // warmup: pull each workload once so every cache has seen a request
    {
        let start = Instant::now();

        let futures = workloads.iter().map(|(_, workload)| {
            let workload = Arc::clone(workload);
            tokio::spawn(async move { process_workload(&workload).await })
        });

        for result in futures::future::join_all(futures).await {
            result??;
        }

        println!("Warmup: {:?}", start.elapsed());
    };
    println!();

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for (concurrency, workload) in workloads.iter() {
        let concurrency = *concurrency;
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start + duration);
        let workload = Arc::clone(workload);

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let unchanged = Arc::new(AtomicUsize::new(0));
            let failed = Arc::new(AtomicUsize::new(0));
            let semaphore = Arc::new(Semaphore::new(concurrency));

            // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            loop {
                if deadline.elapsed() > Duration::ZERO {
                    break;
                }
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        let workload = Arc::clone(&workload);
                        let task_durations = Arc::clone(&task_durations);
                        let unchanged = Arc::clone(&unchanged);
                        let failed = Arc::clone(&failed);
                        let task_start = Instant::now();

                        tokio::spawn(async move {
                            match process_workload(&workload).await {
                                Ok(Outcome::Unchanged) => {
                                    unchanged.fetch_add(1, Ordering::Relaxed);
                                }
                                Ok(Outcome::Changed) => {}
                                Err(_) => {
                                    failed.fetch_add(1, Ordering::Relaxed);
                                }
                            }

                            task_durations
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .add(task_start.elapsed().as_secs_f64());

                            drop(permit);
                        });
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;

            let task_durations: DDSketch = {
                let mut task_durations = task_durations.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *task_durations)
            };

            WorkloadReport {
                concurrency,
                task_durations,
                unchanged: unchanged.load(Ordering::Relaxed),
                failed: failed.load(Ordering::Relaxed),
            }
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for (i, task) in finished_tasks.into_iter().enumerate() {
        let report = task?;
        let (_, workload) = &workloads[i];
        let WorkloadReport {
            concurrency,
            task_durations,
            unchanged,
            failed,
        } = report;

        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        println!("Workload {i} (concurrency: {concurrency}): {ops} operations, {ops_ps:.2} ops/s");

        let unchanged_ratio = unchanged as f64 / ops.max(1) as f64 * 100.0;
        let computations = workload.cache.request().computations();
        let resources = workload.cache.entry_count();
        println!(
            "  unchanged: {unchanged_ratio:.1}%; computations: {computations}; failed: {failed}; resources: {resources}"
        );

        if ops == 0 {
            continue;
        }
        let quantile = |q| {
            let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let (p50, p90, p99) = (quantile(0.5), quantile(0.9), quantile(0.99));
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
    }

    Ok(())
}

struct WorkloadReport {
    concurrency: usize,
    task_durations: DDSketch,
    unchanged: usize,
    failed: usize,
}
