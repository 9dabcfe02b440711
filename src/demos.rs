//! Built-in workloads exercised by the `asymptote` binary.

use std::hint::black_box;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;

use asymptote::{Benchmark, Registry};

struct Builder<'a> {
    registry: Registry,
    filter: Option<&'a str>,
}

impl Builder<'_> {
    fn add<T: 'static>(&mut self, bench: Benchmark<T>) -> Result<()> {
        if self.filter.is_some_and(|f| !bench.name().contains(f)) {
            return Ok(());
        }
        self.registry.register(bench)?;
        Ok(())
    }
}

fn fib(n: u64) -> u64 {
    if n < 2 {
        n
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

fn random_vec(len: u64) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Demo benchmarks whose name contains `filter`, in a fixed order.
pub fn registry(filter: Option<&str>) -> Result<Registry> {
    let mut b = Builder {
        registry: Registry::new(),
        filter,
    };

    b.add(Benchmark::new("fib", |n: &u64| {
        black_box(fib(black_box(*n)));
        Ok(())
    })
    .base_case(|| Ok(20)))?;

    b.add(
        Benchmark::new("sort", |v: &Vec<u64>| {
            let mut v = v.clone();
            v.sort_unstable();
            black_box(v);
            Ok(())
        })
        .base_case(|| Ok(random_vec(1000)))
        .sizes(1, |s| Ok(random_vec(s[0]))),
    )?;

    b.add(
        Benchmark::new("sum", |v: &Vec<u64>| {
            black_box(v.iter().fold(0u64, |acc, x| acc.wrapping_add(*x)));
            Ok(())
        })
        .sizes(1, |s| Ok((0..s[0]).collect())),
    )?;

    b.add(
        Benchmark::new("grid", |&(rows, cols): &(u64, u64)| {
            let mut acc = 0u64;
            for r in 0..rows {
                for c in 0..cols {
                    acc = acc.wrapping_add(black_box(r ^ c));
                }
            }
            black_box(acc);
            Ok(())
        })
        .sizes(2, |s| Ok((s[0], s[1]))),
    )?;

    b.add(
        Benchmark::pure("sleep", || {
            thread::sleep(Duration::from_micros(200));
            Ok(())
        })
        .iterations(20)
        .iterations_per_sample(1),
    )?;

    b.add(Benchmark::pure("noop", || Ok(())))?;

    Ok(b.registry)
}
