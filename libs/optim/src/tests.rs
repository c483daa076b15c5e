use approx::assert_abs_diff_eq;
use test_log::test;

use crate::*;

fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| (v - 1.).powi(2)).sum()
}

fn rosenbrock(x: &[f64]) -> f64 {
    (1. - x[0]).powi(2) + 100. * (x[1] - x[0].powi(2)).powi(2)
}

#[test]
fn lbfgsb_finds_interior_minimum() {
    let res = Lbfgsb::default()
        .minimize(sphere, &[4., -3., 0.], &[(-5., 5.); 3])
        .unwrap();
    for v in &res.x {
        assert_abs_diff_eq!(*v, 1., epsilon = 1e-3);
    }
    assert!(res.fun < 1e-6);
}

#[test]
fn lbfgsb_minimizes_rosenbrock() {
    let res = Lbfgsb::default()
        .minimize(rosenbrock, &[-1.2, 1.], &[(-2., 2.), (-2., 2.)])
        .unwrap();
    assert_abs_diff_eq!(res.x[0], 1., epsilon = 1e-2);
    assert_abs_diff_eq!(res.x[1], 1., epsilon = 2e-2);
}

#[test]
fn lbfgsb_stops_at_active_bound() {
    let res = Lbfgsb::default()
        .minimize(sphere, &[2.5, 2.5], &[(2., 3.), (-1., 3.)])
        .unwrap();
    assert_abs_diff_eq!(res.x[0], 2., epsilon = 1e-9);
    assert_abs_diff_eq!(res.x[1], 1., epsilon = 1e-3);
}

#[test]
fn lbfgsb_clamps_start_and_respects_bounds() {
    let bounds = [(0., 0.5), (0., 0.5)];
    let res = Lbfgsb::default()
        .minimize(
            |x: &[f64]| {
                assert!(x.iter().zip(&bounds).all(|(v, (lo, hi))| lo <= v && v <= hi));
                sphere(x)
            },
            &[10., -10.],
            &bounds,
        )
        .unwrap();
    assert_abs_diff_eq!(res.x[0], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(res.x[1], 0.5, epsilon = 1e-9);
}

#[test]
fn lbfgsb_respects_evaluation_budget() {
    let opts = Lbfgsb {
        maxfun: 10,
        ..Lbfgsb::default()
    };
    let res = opts
        .minimize(rosenbrock, &[-1.2, 1.], &[(-2., 2.), (-2., 2.)])
        .unwrap();
    assert_eq!(res.status, Status::MaxEvaluations);
    assert!(!res.success());
    // The budget is checked between iterations, so one line search and one
    // gradient may run past it.
    assert!(res.nfev < 40);
}

#[test]
fn lbfgsb_honors_stop_sentinel() {
    let res = Lbfgsb::default()
        .minimize(
            |x: &[f64]| {
                if x[0] < 2. {
                    f64::NEG_INFINITY
                } else {
                    sphere(x)
                }
            },
            &[4.],
            &[(-5., 5.)],
        )
        .unwrap();
    assert_eq!(res.status, Status::Stopped);
    assert!(res.success());
    assert_eq!(res.fun, f64::NEG_INFINITY);
    assert!(res.x[0] < 2.);
}

#[test]
fn lbfgsb_rejects_bad_problems() {
    let opts = Lbfgsb::default();
    assert_eq!(
        opts.minimize(sphere, &[], &[]).unwrap_err(),
        Error::EmptyBounds
    );
    assert_eq!(
        opts.minimize(sphere, &[0.], &[(1., 0.)]).unwrap_err(),
        Error::InvalidBounds {
            index: 0,
            lo: 1.,
            hi: 0.
        }
    );
    assert_eq!(
        opts.minimize(sphere, &[0., 0.], &[(0., 1.)]).unwrap_err(),
        Error::DimensionMismatch {
            expected: 1,
            found: 2
        }
    );
}

#[test]
fn de_finds_global_minimum() {
    let de = DifferentialEvolution {
        seed: Some(42),
        polish: None,
        ..DifferentialEvolution::default()
    };
    let res = de.minimize(sphere, &[(-5., 5.), (-5., 5.)]).unwrap();
    assert_abs_diff_eq!(res.x[0], 1., epsilon = 0.1);
    assert_abs_diff_eq!(res.x[1], 1., epsilon = 0.1);
}

#[test]
fn de_polish_refines_solution() {
    let de = DifferentialEvolution {
        seed: Some(7),
        maxiter: 30,
        updating: Updating::Deferred,
        ..DifferentialEvolution::default()
    };
    let res = de.minimize(rosenbrock, &[(-2., 2.), (-2., 2.)]).unwrap();
    assert!(res.fun < 1e-4, "fun = {}", res.fun);
}

#[test]
fn de_is_deterministic_with_seed() {
    let de = DifferentialEvolution {
        seed: Some(42),
        maxiter: 5,
        polish: None,
        ..DifferentialEvolution::default()
    };
    let a = de.minimize(rosenbrock, &[(-2., 2.), (-2., 2.)]).unwrap();
    let b = de.minimize(rosenbrock, &[(-2., 2.), (-2., 2.)]).unwrap();
    assert_eq!(a, b);
}

#[test]
fn de_population_respects_bounds_and_size() {
    let bounds = [(10., 20.), (-1., 0.), (3., 3.)];
    let mut count = 0;
    let de = DifferentialEvolution {
        seed: Some(1),
        maxiter: 3,
        popsize: 2,
        tol: 0.,
        polish: None,
        ..DifferentialEvolution::default()
    };
    let res = de
        .minimize(
            |x: &[f64]| {
                count += 1;
                assert!(x.iter().zip(&bounds).all(|(v, (lo, hi))| lo <= v && v <= hi));
                x.iter().sum()
            },
            &bounds,
        )
        .unwrap();
    assert_eq!(res.status, Status::MaxIterations);
    // Six members, evaluated once at start and once per generation.
    assert_eq!(count, 6 * 4);
    assert_eq!(res.nfev, 24);
}

#[test]
fn de_stops_on_sentinel() {
    let mut calls = 0;
    let de = DifferentialEvolution {
        seed: Some(3),
        ..DifferentialEvolution::default()
    };
    let res = de
        .minimize(
            |x: &[f64]| {
                calls += 1;
                if calls == 12 {
                    f64::NEG_INFINITY
                } else {
                    sphere(x)
                }
            },
            &[(-5., 5.), (-5., 5.)],
        )
        .unwrap();
    assert_eq!(res.status, Status::Stopped);
    assert_eq!(res.nfev, 12);
    assert_eq!(res.x.len(), 2);
}

#[test]
fn nan_is_treated_as_worst() {
    let de = DifferentialEvolution {
        seed: Some(5),
        polish: None,
        maxiter: 50,
        ..DifferentialEvolution::default()
    };
    let res = de
        .minimize(
            |x: &[f64]| if x[0] > 0. { f64::NAN } else { sphere(x) },
            &[(-5., 5.), (-5., 5.)],
        )
        .unwrap();
    assert!(res.x[0] <= 0.);
    assert!(res.fun.is_finite());
}
