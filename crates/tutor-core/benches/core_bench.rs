//! Criterion benchmarks for tutor-core.
//!
//! ## Benchmark groups
//!
//! 1. **schema**: cache database DDL and migration overhead.
//! 2. **extraction**: parse + symbol extraction per language.
//! 3. **scoring**: pattern detection, complexity metrics, teaching value.
//! 4. **graph_build**: import resolution and cycle detection on synthetic
//!    projects of increasing size.
//! 5. **cache**: memory-tier hits, durable-tier promotion, writes.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/tutor-core/Cargo.toml
//! # Run only the graph group:
//! cargo bench --manifest-path crates/tutor-core/Cargo.toml -- graph_build
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusqlite::Connection;

use tutor_core::cache::memory::MemoryTier;
use tutor_core::config::CacheConfig;
use tutor_core::engine::analyze_source;
use tutor_core::graph::DependencyGraph;
use tutor_core::indexer::imports::ImportResolver;
use tutor_core::indexer::metrics::{compute_complexity, score_teaching_value};
use tutor_core::indexer::parser::ParserRegistry;
use tutor_core::indexer::patterns::detect_patterns;
use tutor_core::models::FileAnalysis;
use tutor_core::store::schema::{get_schema_version, init_schema, migrate_schema, SCHEMA_VERSION};
use tutor_core::CacheManager;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const PYTHON_SOURCE: &str = r#"
"""Order service."""
import logging
from dataclasses import dataclass

from shop.models import Order, Item


@dataclass
class LineItem:
    """One line of an order."""
    sku: str
    qty: int


class OrderService:
    """Creates and prices orders."""

    def __init__(self, repo):
        self.repo = repo

    async def create(self, items):
        """Create an order from items."""
        if not items:
            raise ValueError("empty order")
        total = 0
        for item in items:
            if item.qty > 10 and item.sku.startswith("B"):
                total += item.qty * 0.9
            elif item.qty > 0:
                total += item.qty
        try:
            return await self.repo.save(Order(items, total))
        except IOError:
            logging.exception("save failed")
            raise
"#;

const TYPESCRIPT_SOURCE: &str = r#"
import { Router } from 'express';
import { OrderService } from './services/order';

/** HTTP routes for orders. */
export class OrderController {
  constructor(private readonly service: OrderService) {}

  register(router: Router) {
    router.get('/orders/:id', async (req, res) => {
      const order = await this.service.find(req.params.id);
      res.json(order ?? { error: 'not found' });
    });
  }
}

export function total(items: { qty: number }[]): number {
  let sum = 0;
  for (const item of items) {
    if (item.qty > 0 || item.qty === -1) {
      sum += item.qty;
    }
  }
  return sum;
}
"#;

const JAVA_SOURCE: &str = r#"
package com.shop.orders;

import java.util.List;
import com.shop.model.Order;

/** Prices orders. */
public class PricingService extends BaseService implements Pricing {
    @Override
    public double price(List<Order> orders) {
        double total = 0;
        for (Order order : orders) {
            if (order.isDiscounted() && order.size() > 3) {
                total += order.amount() * 0.9;
            } else {
                total += order.amount();
            }
        }
        return total;
    }
}
"#;

const GO_SOURCE: &str = r#"
package orders

import (
	"errors"
	"net/http"
)

// Service prices orders.
type Service struct {
	repo Repository
}

// Price sums line items.
func (s *Service) Price(items []Item) (int, error) {
	if len(items) == 0 {
		return 0, errors.New("empty")
	}
	total := 0
	for _, it := range items {
		switch {
		case it.Qty > 10:
			total += it.Qty * 9 / 10
		default:
			total += it.Qty
		}
	}
	return total, nil
}

func Handler(w http.ResponseWriter, r *http.Request) {}
"#;

/// `n` python modules where module i imports i+1 and i+2, with a back edge
/// every 10 modules so cycle detection has work.
fn synthetic_project(n: usize) -> BTreeMap<String, FileAnalysis> {
    let registry = ParserRegistry::with_default_grammars();
    (0..n)
        .map(|i| {
            let mut source = String::from("import os\n");
            for j in [i + 1, i + 2] {
                if j < n {
                    source.push_str(&format!("import pkg.m{j}\n"));
                }
            }
            if i % 10 == 9 {
                source.push_str(&format!("import pkg.m{}\n", i - 9));
            }
            source.push_str("\ndef run(x):\n    return x\n");
            let path = format!("pkg/m{i}.py");
            let analysis = analyze_source(&registry, &path, "python", source.as_bytes());
            (path, analysis)
        })
        .collect()
}

// ===========================================================================
// 1. Schema
// ===========================================================================

fn bench_schema(c: &mut Criterion) {
    c.bench_function("schema_init_and_migrate", |b| {
        b.iter(|| {
            let conn = Connection::open_in_memory().unwrap();
            init_schema(&conn).unwrap();
            black_box(&conn);
        });
    });

    c.bench_function("schema_migration_noop_on_current", |b| {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        b.iter(|| {
            migrate_schema(black_box(&conn)).unwrap();
        });
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    });
}

// ===========================================================================
// 2. Extraction
// ===========================================================================

fn bench_extraction(c: &mut Criterion) {
    let registry = ParserRegistry::with_default_grammars();
    let mut group = c.benchmark_group("extraction");
    for (path, source) in [
        ("orders.py", PYTHON_SOURCE),
        ("orders.ts", TYPESCRIPT_SOURCE),
        ("PricingService.java", JAVA_SOURCE),
        ("orders.go", GO_SOURCE),
    ] {
        group.bench_with_input(BenchmarkId::new("parse_and_extract", path), source, |b, src| {
            b.iter(|| {
                let parsed = registry.parse(path, src.as_bytes()).unwrap();
                black_box(registry.extract(&parsed).unwrap());
            });
        });
    }
    group.finish();
}

// ===========================================================================
// 3. Scoring
// ===========================================================================

fn bench_scoring(c: &mut Criterion) {
    let registry = ParserRegistry::with_default_grammars();
    let parsed = registry.parse("orders.py", PYTHON_SOURCE.as_bytes()).unwrap();
    let symbols = registry.extract(&parsed).unwrap();

    let mut group = c.benchmark_group("scoring");
    group.bench_function("detect_patterns", |b| {
        b.iter(|| black_box(detect_patterns(&symbols, PYTHON_SOURCE, "shop/orders.py")));
    });
    group.bench_function("compute_complexity", |b| {
        b.iter(|| black_box(compute_complexity(&symbols, PYTHON_SOURCE)));
    });
    let patterns = detect_patterns(&symbols, PYTHON_SOURCE, "shop/orders.py");
    let metrics = compute_complexity(&symbols, PYTHON_SOURCE);
    group.bench_function("score_teaching_value", |b| {
        b.iter(|| black_box(score_teaching_value(&symbols, &metrics, &patterns)));
    });
    group.bench_function("analyze_source_end_to_end", |b| {
        b.iter(|| {
            black_box(analyze_source(
                &registry,
                "shop/orders.py",
                "python",
                PYTHON_SOURCE.as_bytes(),
            ))
        });
    });
    group.finish();
}

// ===========================================================================
// 4. Graph build
// ===========================================================================

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    for n in [50usize, 500, 2_000] {
        let files = synthetic_project(n);
        let resolver = ImportResolver::new(files.keys(), None);
        group.bench_with_input(BenchmarkId::from_parameter(n), &files, |b, files| {
            b.iter(|| black_box(DependencyGraph::build(files, &resolver)));
        });
    }
    group.finish();
}

// ===========================================================================
// 5. Cache
// ===========================================================================

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let value = serde_json::to_string(&"x".repeat(2_048)).unwrap();

    group.bench_function("memory_tier_insert_with_eviction", |b| {
        let mut tier = MemoryTier::new(256 * 1024);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(tier.insert(&format!("k{}", i % 1_000), value.clone(), f64::MAX));
        });
    });

    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(CacheConfig::for_data_dir(dir.path()));
    cache.initialize();
    for i in 0..1_000 {
        cache.set_raw(&format!("k{i}"), value.clone(), Duration::from_secs(3_600));
    }

    group.bench_function("get_memory_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(cache.get_raw(&format!("k{}", i % 1_000)));
        });
    });

    let durable = CacheManager::new(CacheConfig {
        max_memory_mb: 0,
        ..CacheConfig::for_data_dir(dir.path())
    });
    durable.initialize();
    group.bench_function("get_durable_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(durable.get_raw(&format!("k{}", i % 1_000)));
        });
    });

    group.bench_function("set_all_tiers", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            cache.set_raw(&format!("w{}", i % 1_000), value.clone(), Duration::from_secs(3_600));
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_schema,
    bench_extraction,
    bench_scoring,
    bench_graph_build,
    bench_cache,
);
criterion_main!(benches);
