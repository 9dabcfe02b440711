use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{random, Expression, MAX_RANDOM_DEPTH};

const PERTURB_STEP: f64 = 0.1;
const FITNESS_FLOOR: f64 = 0.1;

/// One observed call: duration in milliseconds and the sizes it ran at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub duration: f64,
    pub sizes: Vec<u64>,
}

/// Squared prediction error over `samples` plus the structural cost of
/// `expr`. Overflowing or undefined predictions score `f64::INFINITY`.
pub fn objective(samples: &[Sample], expr: &Expression) -> f64 {
    let error: f64 = samples
        .iter()
        .map(|s| {
            let d = s.duration - expr.eval(&s.sizes);
            d * d
        })
        .sum();
    let total = error + expr.cost();
    if total.is_finite() {
        total
    } else {
        f64::INFINITY
    }
}

/// Roulette weights: `objective − min + 0.1·(max − min)` over the finite
/// objectives. Infinite objectives get zero weight while any finite one
/// exists. With zero spread, or no usable total, every candidate weighs the
/// same.
pub fn fitness(objectives: &[f64]) -> Vec<f64> {
    let (low, high) = objectives
        .iter()
        .copied()
        .filter(|o| o.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), o| {
            (lo.min(o), hi.max(o))
        });

    if !low.is_finite() {
        return vec![1.0; objectives.len()];
    }
    if high <= low {
        return objectives
            .iter()
            .map(|o| if o.is_finite() { 1.0 } else { 0.0 })
            .collect();
    }

    let floor = FITNESS_FLOOR * (high - low);
    let weights: Vec<f64> = objectives
        .iter()
        .map(|&o| if o.is_finite() { o - low + floor } else { 0.0 })
        .collect();
    if weights.iter().sum::<f64>().is_finite() {
        weights
    } else {
        objectives
            .iter()
            .map(|o| if o.is_finite() { 1.0 } else { 0.0 })
            .collect()
    }
}

enum Selector {
    Weighted(WeightedIndex<f64>),
    Uniform(usize),
}

impl Selector {
    fn new(weights: &[f64]) -> Self {
        match WeightedIndex::new(weights) {
            Ok(index) => Self::Weighted(index),
            Err(_) => Self::Uniform(weights.len()),
        }
    }

    fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match self {
            Self::Weighted(index) => index.sample(rng),
            Self::Uniform(len) => rng.gen_range(0..*len),
        }
    }
}

/// Recombine two parents. With probability `skip` the pair comes back
/// untouched; a larger `skip` means fewer crossovers.
pub fn crossover<R: Rng + ?Sized>(
    first: &Expression,
    second: &Expression,
    skip: f64,
    rng: &mut R,
) -> (Expression, Expression) {
    if rng.gen::<f64>() < skip {
        return (first.clone(), second.clone());
    }

    match (first, second) {
        (
            Expression::Exp { child: c1, a: a1, b: b1 },
            Expression::Exp { child: c2, a: a2, b: b2 },
        ) => {
            let (n1, n2) = crossover(c1, c2, skip, rng);
            swap_coefficients(
                &Expression::Exp { child: Box::new(n1), a: *a1, b: *b1 },
                &Expression::Exp { child: Box::new(n2), a: *a2, b: *b2 },
            )
        }
        (
            Expression::Log { child: c1, a: a1, b: b1 },
            Expression::Log { child: c2, a: a2, b: b2 },
        ) => {
            let (n1, n2) = crossover(c1, c2, skip, rng);
            swap_coefficients(
                &Expression::Log { child: Box::new(n1), a: *a1, b: *b1 },
                &Expression::Log { child: Box::new(n2), a: *a2, b: *b2 },
            )
        }
        (
            Expression::Add { a: a1, b: b1, children: cs1 },
            Expression::Add { a: a2, b: b2, children: cs2 },
        ) => {
            let (left, right): (Vec<_>, Vec<_>) = cs1
                .iter()
                .zip(cs2)
                .map(|(x, y)| crossover(x, y, skip, rng))
                .unzip();
            swap_coefficients(
                &Expression::Add { a: *a1, b: *b1, children: left },
                &Expression::Add { a: *a2, b: *b2, children: right },
            )
        }
        _ => swap_coefficients(first, second),
    }
}

/// Exchange affine coefficients. When a constant is involved only the first
/// coefficient moves: the constant's value for the other side's `a`.
fn swap_coefficients(first: &Expression, second: &Expression) -> (Expression, Expression) {
    let (a1, b1) = first.coefficients();
    let (a2, b2) = second.coefficients();
    if first.is_constant() || second.is_constant() {
        (first.with_coefficients(a2, b1), second.with_coefficients(a1, b2))
    } else {
        (first.with_coefficients(a2, b2), second.with_coefficients(a1, b1))
    }
}

/// Rewrite one expression. With probability `skip` it is returned as is.
pub fn mutate<R: Rng + ?Sized>(
    expr: &Expression,
    size_count: usize,
    skip: f64,
    rng: &mut R,
) -> Expression {
    if rng.gen::<f64>() < skip {
        return expr.clone();
    }

    match expr {
        Expression::Constant { value } => match rng.gen_range(0..6) {
            0 => Expression::Variable {
                index: random_index(size_count, rng),
                a: *value,
                b: 0.0,
            },
            1 => Expression::exp(expr.clone()),
            2 => Expression::log(expr.clone()),
            3 => promote(expr, size_count, rng),
            4 => random(rng, size_count, MAX_RANDOM_DEPTH),
            _ => Expression::constant(value + perturbation(rng)),
        },
        Expression::Variable { a, b, .. } => match rng.gen_range(0..7) {
            0 => Expression::Variable {
                index: random_index(size_count, rng),
                a: *a,
                b: *b,
            },
            1 => Expression::exp(expr.clone()),
            2 => Expression::log(expr.clone()),
            3 => promote(expr, size_count, rng),
            4 => Expression::constant(*a),
            5 => random(rng, size_count, MAX_RANDOM_DEPTH),
            _ => perturb(expr, rng),
        },
        Expression::Exp { child, a, b } | Expression::Log { child, a, b } => {
            match rng.gen_range(0..7) {
                0 => child.as_ref().clone(),
                1 => Expression::exp(expr.clone()),
                2 => Expression::log(expr.clone()),
                3 => {
                    let child = Box::new(mutate(child, size_count, skip, rng));
                    match expr {
                        Expression::Exp { .. } => Expression::Exp { child, a: *a, b: *b },
                        _ => Expression::Log { child, a: *a, b: *b },
                    }
                }
                4 => promote(expr, size_count, rng),
                5 => random(rng, size_count, MAX_RANDOM_DEPTH),
                _ => perturb(expr, rng),
            }
        }
        Expression::Add { a, b, children } => match rng.gen_range(0..5) {
            0 => {
                let mut kept = children.clone();
                if !kept.is_empty() {
                    kept.remove(rng.gen_range(0..kept.len()));
                }
                match kept.len() {
                    0 => Expression::constant(*b),
                    1 => kept.swap_remove(0),
                    _ => Expression::Add { a: *a, b: *b, children: kept },
                }
            }
            1 => {
                let mut grown = children.clone();
                grown.push(random(rng, size_count, MAX_RANDOM_DEPTH));
                Expression::Add { a: *a, b: *b, children: grown }
            }
            2 => Expression::Add {
                a: *a,
                b: *b,
                children: children
                    .iter()
                    .map(|c| mutate(c, size_count, skip, rng))
                    .collect(),
            },
            3 => random(rng, size_count, MAX_RANDOM_DEPTH),
            _ => perturb(expr, rng),
        },
    }
}

fn random_index<R: Rng + ?Sized>(size_count: usize, rng: &mut R) -> usize {
    if size_count == 0 {
        0
    } else {
        rng.gen_range(0..size_count)
    }
}

fn perturbation<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(-PERTURB_STEP..=PERTURB_STEP)
}

fn perturb<R: Rng + ?Sized>(expr: &Expression, rng: &mut R) -> Expression {
    let (a, b) = expr.coefficients();
    expr.with_coefficients(a + perturbation(rng), b + perturbation(rng))
}

/// `add(expr, x_i)` over a random dimension.
fn promote<R: Rng + ?Sized>(expr: &Expression, size_count: usize, rng: &mut R) -> Expression {
    if size_count == 0 {
        return Expression::add(vec![expr.clone(), Expression::constant(0.0)]);
    }
    let term = Expression::variable(rng.gen_range(0..size_count));
    Expression::add(vec![expr.clone(), term])
}

/// Random starting population.
pub fn init<R: Rng + ?Sized>(
    size_count: usize,
    population_size: usize,
    rng: &mut R,
) -> Vec<Expression> {
    (0..population_size)
        .map(|_| random(rng, size_count, MAX_RANDOM_DEPTH))
        .collect()
}

/// One generation: roulette selection, crossover, mutation, then elitism.
/// The result has the input's size and is sorted by ascending objective.
pub fn generation<R: Rng + ?Sized>(
    samples: &[Sample],
    population: &[Expression],
    size_count: usize,
    crossover_skip: f64,
    mutation_skip: f64,
    rng: &mut R,
) -> Vec<Expression> {
    if population.is_empty() {
        return Vec::new();
    }

    let objectives: Vec<f64> = population.iter().map(|e| objective(samples, e)).collect();
    let (best_index, best) = lowest(&objectives);
    let selector = Selector::new(&fitness(&objectives));

    let mut offspring = Vec::with_capacity(population.len());
    while offspring.len() < population.len() {
        let p1 = &population[selector.pick(rng)];
        let p2 = &population[selector.pick(rng)];
        let (c1, c2) = crossover(p1, p2, crossover_skip, rng);
        offspring.push(mutate(&c1, size_count, mutation_skip, rng));
        if offspring.len() < population.len() {
            offspring.push(mutate(&c2, size_count, mutation_skip, rng));
        }
    }

    let mut scored: Vec<(f64, Expression)> = offspring
        .into_iter()
        .map(|e| (objective(samples, &e), e))
        .collect();
    let new_objectives: Vec<f64> = scored.iter().map(|(o, _)| *o).collect();
    let (_, new_best) = lowest(&new_objectives);
    if best < new_best {
        let worst = highest(&new_objectives);
        scored[worst] = (best, population[best_index].clone());
    }

    scored.sort_by(|x, y| x.0.total_cmp(&y.0));
    scored.into_iter().map(|(_, e)| e).collect()
}

fn lowest(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::INFINITY), |acc, (i, v)| if v < acc.1 { (i, v) } else { acc })
}

fn highest(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|x, y| x.1.total_cmp(y.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Knobs of the search, shared by every benchmark of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvolutionSettings {
    pub population_size: usize,
    pub crossover_skip: f64,
    pub mutation_skip: f64,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            population_size: 64,
            crossover_skip: 0.5,
            mutation_skip: 0.5,
        }
    }
}

/// Current best hypothesis of a [`ComplexityModel`].
#[derive(Clone, Debug, PartialEq)]
pub struct Fit {
    pub expression: Expression,
    pub objective: f64,
    pub samples: usize,
}

/// Evolving complexity model of one parameterized benchmark.
pub struct ComplexityModel {
    size_count: usize,
    settings: EvolutionSettings,
    samples: Vec<Sample>,
    population: Vec<Expression>,
    rng: StdRng,
}

impl ComplexityModel {
    pub fn new(size_count: usize, settings: EvolutionSettings) -> Self {
        Self::with_rng(size_count, settings, StdRng::from_entropy())
    }

    pub fn with_seed(size_count: usize, settings: EvolutionSettings, seed: u64) -> Self {
        Self::with_rng(size_count, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(size_count: usize, settings: EvolutionSettings, rng: StdRng) -> Self {
        Self {
            size_count,
            settings,
            samples: Vec::new(),
            population: Vec::new(),
            rng,
        }
    }

    /// Add a sample and run one generation over everything seen so far.
    pub fn observe(&mut self, duration: f64, sizes: Vec<u64>) -> Fit {
        self.samples.push(Sample { duration, sizes });
        if self.population.is_empty() {
            self.population = init(
                self.size_count,
                self.settings.population_size.max(1),
                &mut self.rng,
            );
        }
        self.population = generation(
            &self.samples,
            &self.population,
            self.size_count,
            self.settings.crossover_skip,
            self.settings.mutation_skip,
            &mut self.rng,
        );

        let expression = self.population[0].clone();
        Fit {
            objective: objective(&self.samples, &expression),
            expression,
            samples: self.samples.len(),
        }
    }

    pub fn best(&self) -> Option<&Expression> {
        self.population.first()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn population(&self) -> &[Expression] {
        &self.population
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn linear_samples() -> Vec<Sample> {
        (1..=20)
            .map(|n| Sample {
                duration: 0.5 * n as f64 + 2.0,
                sizes: vec![n],
            })
            .collect()
    }

    fn var(index: usize, a: f64, b: f64) -> Expression {
        Expression::Variable { index, a, b }
    }

    #[test]
    fn objective_adds_error_and_cost() {
        let samples = vec![
            Sample { duration: 3.0, sizes: vec![1] },
            Sample { duration: 5.0, sizes: vec![2] },
        ];
        // exact fit: only the structural cost remains
        assert_eq!(objective(&samples, &var(0, 2.0, 1.0)), 2.0);
        // constant 4: errors 1 and 1, cost 1
        assert_eq!(objective(&samples, &Expression::constant(4.0)), 3.0);
        let overflow = Expression::exp(Expression::constant(1e6));
        assert_eq!(objective(&samples, &overflow), f64::INFINITY);
        let undefined = Expression::log(Expression::constant(-1.0));
        assert_eq!(objective(&samples, &undefined), f64::INFINITY);
    }

    #[test]
    fn fitness_keeps_a_floor() {
        let weights = fitness(&[1.0, 3.0, 11.0]);
        assert_eq!(weights, vec![1.0, 3.0, 11.0]);
        assert!(weights.iter().all(|w| *w > 0.0));
    }

    #[test]
    fn fitness_degenerate_cases_are_uniform() {
        assert_eq!(fitness(&[2.0, 2.0, 2.0]), vec![1.0, 1.0, 1.0]);
        assert_eq!(fitness(&[2.0, f64::INFINITY]), vec![1.0, 0.0]);
        assert_eq!(
            fitness(&[f64::INFINITY, f64::INFINITY]),
            vec![1.0, 1.0]
        );
        let weights = fitness(&[0.0, 4.0, f64::INFINITY]);
        assert_eq!(weights[2], 0.0);
        assert!(weights[0] > 0.0);
    }

    #[test]
    fn crossover_with_full_skip_returns_parents() {
        let mut rng = rng();
        let p1 = Expression::add(vec![var(0, 1.0, 2.0), Expression::constant(3.0)]);
        let p2 = Expression::exp(var(0, 4.0, 5.0));
        for _ in 0..100 {
            let (c1, c2) = crossover(&p1, &p2, 1.0, &mut rng);
            assert_eq!(c1, p1);
            assert_eq!(c2, p2);
        }
    }

    #[test]
    fn crossover_without_skip_swaps_coefficients() {
        let mut rng = rng();
        let (c1, c2) = crossover(&var(0, 1.0, 2.0), &var(1, 3.0, 4.0), 0.0, &mut rng);
        assert_eq!(c1, var(0, 3.0, 4.0));
        assert_eq!(c2, var(1, 1.0, 2.0));
    }

    #[test]
    fn crossover_constant_donates_value() {
        let mut rng = rng();
        let (c1, c2) = crossover(&Expression::constant(7.0), &var(0, 3.0, 4.0), 0.0, &mut rng);
        assert_eq!(c1, Expression::constant(3.0));
        assert_eq!(c2, var(0, 7.0, 4.0));

        let (c1, c2) = crossover(&var(0, 3.0, 4.0), &Expression::constant(7.0), 0.0, &mut rng);
        assert_eq!(c1, var(0, 7.0, 4.0));
        assert_eq!(c2, Expression::constant(3.0));

        let (c1, c2) = crossover(
            &Expression::constant(1.0),
            &Expression::constant(2.0),
            0.0,
            &mut rng,
        );
        assert_eq!(c1, Expression::constant(2.0));
        assert_eq!(c2, Expression::constant(1.0));
    }

    #[test]
    fn crossover_recurses_into_matching_composites() {
        let mut rng = rng();
        let p1 = Expression::Exp {
            child: Box::new(var(0, 1.0, 1.0)),
            a: 10.0,
            b: 20.0,
        };
        let p2 = Expression::Exp {
            child: Box::new(var(0, 2.0, 2.0)),
            a: 30.0,
            b: 40.0,
        };
        let (c1, c2) = crossover(&p1, &p2, 0.0, &mut rng);
        assert_eq!(
            c1,
            Expression::Exp {
                child: Box::new(var(0, 2.0, 2.0)),
                a: 30.0,
                b: 40.0
            }
        );
        assert_eq!(
            c2,
            Expression::Exp {
                child: Box::new(var(0, 1.0, 1.0)),
                a: 10.0,
                b: 20.0
            }
        );
    }

    #[test]
    fn crossover_mismatched_composites_only_swap_coefficients() {
        let mut rng = rng();
        let p1 = Expression::Exp {
            child: Box::new(var(0, 1.0, 1.0)),
            a: 10.0,
            b: 20.0,
        };
        let p2 = Expression::Log {
            child: Box::new(var(0, 2.0, 2.0)),
            a: 30.0,
            b: 40.0,
        };
        let (c1, c2) = crossover(&p1, &p2, 0.0, &mut rng);
        assert_eq!(c1, p1.with_coefficients(30.0, 40.0));
        assert_eq!(c2, p2.with_coefficients(10.0, 20.0));
    }

    #[test]
    fn crossover_of_sums_truncates_to_shorter() {
        let mut rng = rng();
        let p1 = Expression::add(vec![var(0, 1.0, 0.0), var(0, 2.0, 0.0), var(0, 3.0, 0.0)]);
        let p2 = Expression::add(vec![var(0, 4.0, 0.0)]);
        let (c1, c2) = crossover(&p1, &p2, 0.0, &mut rng);
        assert_eq!(c1, Expression::add(vec![var(0, 4.0, 0.0)]));
        assert_eq!(c2, Expression::add(vec![var(0, 1.0, 0.0)]));
    }

    #[test]
    fn mutation_with_full_skip_is_identity() {
        let mut rng = rng();
        let e = Expression::log(Expression::add(vec![var(0, 1.0, 2.0), var(1, 3.0, 4.0)]));
        for _ in 0..100 {
            assert_eq!(mutate(&e, 2, 1.0, &mut rng), e);
        }
    }

    #[test]
    fn mutation_changes_and_stays_in_range() {
        fn indices_ok(e: &Expression, size_count: usize) -> bool {
            match e {
                Expression::Constant { .. } => true,
                Expression::Variable { index, .. } => *index < size_count,
                Expression::Exp { child, .. } | Expression::Log { child, .. } => {
                    indices_ok(child, size_count)
                }
                Expression::Add { children, .. } => {
                    children.iter().all(|c| indices_ok(c, size_count))
                }
            }
        }

        let mut rng = rng();
        let mut e = Expression::constant(1.0);
        let mut changed = 0;
        for _ in 0..500 {
            let next = mutate(&e, 3, 0.0, &mut rng);
            if next != e {
                changed += 1;
            }
            assert!(indices_ok(&next, 3));
            // keep trees small
            e = if next.node_count() > 30 {
                Expression::constant(1.0)
            } else {
                next
            };
        }
        assert!(changed > 400);
    }

    #[test]
    fn perturbation_is_bounded() {
        let mut rng = rng();
        let e = var(0, 1.0, 1.0);
        for _ in 0..200 {
            let (a, b) = perturb(&e, &mut rng).coefficients();
            assert!((a - 1.0).abs() <= PERTURB_STEP + 1e-12);
            assert!((b - 1.0).abs() <= PERTURB_STEP + 1e-12);
        }
    }

    #[test]
    fn generation_never_loses_the_champion() {
        let mut rng = rng();
        let samples = linear_samples();
        let mut population = init(1, 16, &mut rng);
        population.push(var(0, 0.5, 2.0));
        for _ in 0..30 {
            let before = population
                .iter()
                .map(|e| objective(&samples, e))
                .fold(f64::INFINITY, f64::min);
            population = generation(&samples, &population, 1, 0.5, 0.5, &mut rng);
            assert_eq!(population.len(), 17);
            assert!(objective(&samples, &population[0]) <= before);
        }
        // the exact model is optimal up to its cost, nothing can beat it
        assert_eq!(objective(&samples, &population[0]), 2.0);
    }

    #[test]
    fn generation_sorts_ascending() {
        let mut rng = rng();
        let samples = linear_samples();
        let population = init(1, 24, &mut rng);
        let next = generation(&samples, &population, 1, 0.5, 0.5, &mut rng);
        let scores: Vec<f64> = next.iter().map(|e| objective(&samples, e)).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn model_best_objective_never_regresses_on_current_data() {
        let mut model = ComplexityModel::with_seed(1, EvolutionSettings::default(), 3);
        let mut previous: Option<Expression> = None;
        for n in 1..=40u64 {
            let fit = model.observe(0.01 * n as f64, vec![n]);
            assert_eq!(fit.samples, n as usize);
            assert_eq!(model.population().len(), 64);
            if let Some(prev) = &previous {
                assert!(fit.objective <= objective(model.samples(), prev));
            }
            previous = Some(fit.expression);
        }
        assert_eq!(model.best(), previous.as_ref());
    }
}
