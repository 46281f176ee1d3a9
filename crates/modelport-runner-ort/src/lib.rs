use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use modelport_core::{
    DType, Device, IOName, ModelArtifact, Runner, Sample, Shape, Tensor, TensorMetadata,
    TensorSpec,
};
use ort::{
    session::{builder::SessionBuilder, Session, SessionInputValue},
    tensor::TensorElementType,
    value::{DynValue, ValueType},
};
use tracing::debug;

/// ONNX Runtime implementation of the pipeline [`Runner`] contract.
///
/// The session is created on `activate` and dropped on `deactivate`,
/// so session memory is only held while a command is replaying samples.
pub struct OrtRunner {
    artifact: ModelArtifact,
    device: Device,
    session: Option<LoadedSession>,
    last_inference_time: Option<Duration>,
}

struct LoadedSession {
    session: Session,
    input_metadata: TensorMetadata,
    output_metadata: TensorMetadata,
}

impl OrtRunner {
    pub fn new(artifact: ModelArtifact, device: Device) -> Self {
        Self {
            artifact,
            device,
            session: None,
            last_inference_time: None,
        }
    }

    /// IO metadata introspected from the model. Available after
    /// activation.
    pub fn metadata(&self) -> Option<(&TensorMetadata, &TensorMetadata)> {
        self.session
            .as_ref()
            .map(|s| (&s.input_metadata, &s.output_metadata))
    }

    fn load_session(&self) -> Result<LoadedSession> {
        let ModelArtifact::OnnxPath(path) = &self.artifact else {
            bail!("onnxruntime runner expects an ONNX file path");
        };

        let builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .context("failed to configure ORT session builder")?;

        let builder = configure_session_builder(builder, &self.device)?;

        let session = builder
            .commit_from_file(path)
            .context("failed to load ONNX model")?;

        let input_metadata = session
            .inputs
            .iter()
            .map(|input| tensor_spec_from_value_type(&input.name, &input.input_type))
            .collect::<Result<TensorMetadata>>()?;
        let output_metadata = session
            .outputs
            .iter()
            .map(|output| tensor_spec_from_value_type(&output.name, &output.output_type))
            .collect::<Result<TensorMetadata>>()?;

        Ok(LoadedSession {
            session,
            input_metadata,
            output_metadata,
        })
    }
}

impl Runner for OrtRunner {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn activate(&mut self) -> Result<()> {
        if self.session.is_none() {
            debug!(model = %self.artifact.path().display(), "loading ORT session");
            self.session = Some(self.load_session()?);
        }
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.session = None;
        Ok(())
    }

    fn infer(&mut self, sample: &Sample) -> Result<Sample> {
        let loaded = self
            .session
            .as_mut()
            .context("runner is not activated")?;

        let mut ort_inputs = Vec::with_capacity(loaded.input_metadata.len());
        for spec in loaded.input_metadata.iter() {
            let tensor = sample
                .get(&spec.name)
                .with_context(|| format!("sample is missing input `{}`", spec.name))?;
            let value = tensor_to_ort_value(tensor)?;
            ort_inputs.push((spec.name.0.clone(), SessionInputValue::from(value)));
        }

        let started = Instant::now();
        let outputs = loaded.session.run(ort_inputs)?;
        self.last_inference_time = Some(started.elapsed());

        let mut result = Sample::new();
        for (name, value) in outputs.iter() {
            result.push(IOName::new(name), ort_value_to_tensor(&value)?);
        }
        Ok(result)
    }

    fn last_inference_time(&self) -> Option<Duration> {
        self.last_inference_time
    }
}

fn configure_session_builder(builder: SessionBuilder, device: &Device) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("CUDA requested but modelport-runner-ort was built without the `cuda` feature")
    }
}

fn tensor_spec_from_value_type(name: &str, value_type: &ValueType) -> Result<TensorSpec> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        bail!("unsupported non-tensor IO value type");
    };

    let dtype = ort_tensor_element_to_dtype(*ty)?;
    let dims = shape
        .iter()
        .map(|d| if *d < 0 { None } else { Some(*d as usize) })
        .collect::<Vec<_>>();

    Ok(TensorSpec {
        name: IOName::new(name),
        dtype,
        dims,
    })
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> Result<DType> {
    match ty {
        TensorElementType::Float32 => Ok(DType::F32),
        TensorElementType::Float16 => Ok(DType::F16),
        TensorElementType::Int64 => Ok(DType::I64),
        TensorElementType::Int32 => Ok(DType::I32),
        TensorElementType::Uint8 => Ok(DType::U8),
        _ => bail!("unsupported tensor element type: {ty}"),
    }
}

fn tensor_to_ort_value(tensor: &Tensor) -> Result<DynValue> {
    let shape: Vec<usize> = tensor.shape.0.iter().copied().collect();
    let expected_bytes = tensor.numel() * tensor.dtype.byte_size();
    ensure!(
        tensor.data.len() == expected_bytes,
        "input byte size mismatch: got {}, expected {}",
        tensor.data.len(),
        expected_bytes
    );

    let value = match tensor.dtype {
        DType::F32 => {
            let data = bytes_to_f32(&tensor.data)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I64 => {
            let data = bytes_to_i64(&tensor.data)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I32 => {
            let data = bytes_to_i32(&tensor.data)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::U8 => {
            let data = tensor.data.to_vec();
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::F16 => bail!("f16 inputs are not supported yet"),
    };

    Ok(value)
}

fn ort_value_to_tensor(value: &ort::value::ValueRef<'_>) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
    let out_shape = Shape::from_slice(&dims);

    match *ty {
        TensorElementType::Float32 => {
            let array = value.try_extract_array::<f32>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            Tensor::from_le_bytes(DType::F32, out_shape, bytes_from_slice(slice))
        }
        TensorElementType::Int64 => {
            let array = value.try_extract_array::<i64>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            Tensor::from_le_bytes(DType::I64, out_shape, bytes_from_slice(slice))
        }
        TensorElementType::Int32 => {
            let array = value.try_extract_array::<i32>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            Tensor::from_le_bytes(DType::I32, out_shape, bytes_from_slice(slice))
        }
        TensorElementType::Uint8 => {
            let array = value.try_extract_array::<u8>()?;
            let slice = array.as_slice().context("non-contiguous output tensor")?;
            Tensor::from_le_bytes(DType::U8, out_shape, Bytes::copy_from_slice(slice))
        }
        TensorElementType::Float16 => bail!("f16 outputs are not supported yet"),
        _ => bail!("unsupported output tensor element type: {ty}"),
    }
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_f32(bytes: &Bytes) -> Result<Vec<f32>> {
    ensure!(bytes.len() % 4 == 0, "f32 input has invalid byte length");
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_i64(bytes: &Bytes) -> Result<Vec<i64>> {
    ensure!(bytes.len() % 8 == 0, "i64 input has invalid byte length");
    Ok(bytes
        .chunks_exact(8)
        .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect())
}

#[allow(clippy::manual_is_multiple_of)]
fn bytes_to_i32(bytes: &Bytes) -> Result<Vec<i32>> {
    ensure!(bytes.len() % 4 == 0, "i32 input has invalid byte length");
    Ok(bytes
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn bytes_from_slice<T>(slice: &[T]) -> Bytes {
    let byte_len = std::mem::size_of_val(slice);
    let ptr = slice.as_ptr().cast::<u8>();
    let bytes = unsafe { std::slice::from_raw_parts(ptr, byte_len) };
    Bytes::copy_from_slice(bytes)
}
