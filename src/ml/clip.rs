// ============================================================
// Layer 5 — Global Gradient-Norm Clipping
// ============================================================
// Clips the accumulated gradients of one optimizer step by their
// global L2 norm, taken over every parameter that has a gradient:
//
//   total = sqrt( Σ_p ||g_p||² )
//   coef  = max_norm / (total + 1e-6)
//   if coef < 1:  g_p ← g_p · coef   for every p
//
// All gradients are scaled by the same factor, so their relative
// magnitudes are preserved. Frozen parameters have no gradient
// and are skipped.
//
// Reference: Pascanu et al. (2013) "On the difficulty of training RNNs"

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};

const NORM_EPS: f64 = 1e-6;

/// Sums the squared L2 norms of the registered gradients.
struct SquaredNorm<'a> {
    grads:  &'a GradientsParams,
    sum_sq: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

/// Multiplies every registered gradient by `scale`.
struct Rescale<'a> {
    grads: &'a mut GradientsParams,
    scale: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register(id, grad.mul_scalar(self.scale));
        }
    }
}

/// Global L2 norm of the gradients `module` has in `grads`.
pub fn grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(module: &M, grads: &GradientsParams) -> f64 {
    let mut visitor = SquaredNorm { grads, sum_sq: 0.0 };
    module.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// Clip `grads` in place to a global norm of at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(
    module:   &M,
    grads:    &mut GradientsParams,
    max_norm: f64,
) -> f64 {
    let total = grad_norm::<B, M>(module, grads);
    let coef  = max_norm / (total + NORM_EPS);
    if coef < 1.0 {
        module.visit(&mut Rescale { grads, scale: coef });
    }
    total
}
