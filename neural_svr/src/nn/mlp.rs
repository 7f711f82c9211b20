//! Fully connected decoder heads.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Shape of a decoder head.
#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Input width.
    pub input_dim: usize,
    /// Output width.
    pub output_dim: usize,
    /// Width of each hidden layer; empty for a single linear map.
    #[config(default = "vec![]")]
    pub hidden_dims: Vec<usize>,
    /// Start the last layer at zero so the head outputs 0 until trained.
    #[config(default = false)]
    pub zero_output: bool,
}

impl MlpConfig {
    /// Build the head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let widths: Vec<usize> = std::iter::once(self.input_dim)
            .chain(self.hidden_dims.iter().copied())
            .collect();
        let hidden = widths
            .windows(2)
            .map(|w| LinearConfig::new(w[0], w[1]).init(device))
            .collect();

        let last = widths.last().copied().unwrap_or(self.input_dim);
        let mut output = LinearConfig::new(last, self.output_dim);
        if self.zero_output {
            output = output.with_initializer(Initializer::Zeros);
        }

        Mlp {
            hidden,
            output: output.init(device),
            activation: Relu::new(),
        }
    }
}

/// ReLU network: hidden layers, then a linear output.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Mlp<B> {
    /// Input shape: [batch, input_dim]
    /// Output shape: [batch, output_dim]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(x, |x, layer| self.activation.forward(layer.forward(x)));
        self.output.forward(x)
    }

    /// Input width.
    pub fn input_dim(&self) -> usize {
        self.hidden
            .first()
            .unwrap_or(&self.output)
            .weight
            .dims()[0]
    }

    /// Output width.
    pub fn output_dim(&self) -> usize {
        self.output.weight.dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_head_shapes() {
        let device = Default::default();
        let config = MlpConfig::new(3, 1).with_hidden_dims(vec![64, 32]);
        let mlp = config.init::<TestBackend>(&device);

        let input = Tensor::zeros([4, 3], &device);
        let output = mlp.forward(input);

        assert_eq!(output.dims(), [4, 1]);
        assert_eq!(mlp.input_dim(), 3);
        assert_eq!(mlp.output_dim(), 1);
    }

    #[test]
    fn test_zero_output_head() {
        let device = Default::default();
        let mlp = MlpConfig::new(5, 3)
            .with_hidden_dims(vec![16])
            .with_zero_output(true)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 2>::ones([7, 5], &device);
        let output: Vec<f32> = mlp.forward(input).to_data().to_vec().unwrap();
        assert_eq!(output.len(), 21);
        assert!(output.iter().all(|&v| v == 0.0));
    }
}
