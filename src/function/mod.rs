//! Loss functions, regularization, and the GLM objectives optimizers minimize.

mod loss;
mod objective;
mod regularization;

pub use loss::{LogisticLoss, Loss, PoissonLoss, PointwiseLoss, SmoothedHingeLoss, SquaredLoss};
pub(crate) use loss::sigmoid;
pub use objective::{
    DistributedGlmObjective, GlmObjective, ObjectiveFunction, SingleNodeGlmObjective, TwiceDiffObjective,
};
pub use regularization::{soft_threshold, RegularizationContext, RegularizationType};
