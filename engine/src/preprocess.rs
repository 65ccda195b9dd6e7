//! Request payload to model tensor conversion.

use image::imageops::FilterType;
use ndarray::{Array2, Array3, ArrayD, Axis, IxDyn};
use serde_json::Value;
use tracing::debug;

use crate::catalog::{ChannelMode, ImageSpec};
use crate::error::GatewayError;

/// Reshapes a feature vector into a single-row matrix.
pub fn feature_row(features: Vec<f64>) -> Result<Array2<f64>, GatewayError> {
    if features.is_empty() {
        return Err(GatewayError::InvalidInput("features must not be empty".to_string()));
    }
    if let Some(index) = features.iter().position(|v| !v.is_finite()) {
        return Err(GatewayError::InvalidInput(format!(
            "feature {index} is not a finite number"
        )));
    }
    let n = features.len();
    Array2::from_shape_vec((1, n), features)
        .map_err(|e| GatewayError::InvalidInput(e.to_string()))
}

/// Converts a nested JSON number array into a dense tensor.
pub fn tensor_from_json(value: &Value) -> Result<ArrayD<f32>, GatewayError> {
    let shape = json_shape(value);
    if shape.is_empty() {
        return Err(GatewayError::InvalidInput("input must be an array".to_string()));
    }
    if shape.contains(&0) {
        return Err(GatewayError::InvalidInput("input must not be empty".to_string()));
    }

    // Only the first branch backs `shape` until flatten_into has walked the rest.
    if shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).is_none() {
        return Err(GatewayError::InvalidInput("input shape is too large".to_string()));
    }
    let mut data = Vec::new();
    flatten_into(value, 0, &shape, &mut data).map_err(GatewayError::InvalidInput)?;

    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| GatewayError::InvalidInput(e.to_string()))
}

// Shape as seen along the first element at every depth.
fn json_shape(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cursor = value;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    shape
}

fn flatten_into(value: &Value, depth: usize, shape: &[usize], out: &mut Vec<f32>) -> Result<(), String> {
    match value {
        Value::Array(items) => {
            if depth >= shape.len() || items.len() != shape[depth] {
                return Err(format!("input is ragged at depth {depth}"));
            }
            items
                .iter()
                .try_for_each(|item| flatten_into(item, depth + 1, shape, out))
        }
        Value::Number(number) => {
            if depth != shape.len() {
                return Err(format!("input is ragged at depth {depth}"));
            }
            let v = number
                .as_f64()
                .ok_or_else(|| format!("{number} is not representable as a float"))?;
            out.push(v as f32);
            Ok(())
        }
        other => Err(format!("expected a number, found {other}")),
    }
}

/// Decodes an uploaded image into a `(1, H, W, C)` tensor scaled to `[0, 1]`.
pub fn image_tensor(bytes: &[u8], spec: &ImageSpec) -> Result<ArrayD<f32>, GatewayError> {
    if bytes.is_empty() {
        return Err(GatewayError::InvalidInput("Uploaded file is empty".to_string()));
    }

    let decoded =
        image::load_from_memory(bytes).map_err(|e| GatewayError::ImageDecode(e.to_string()))?;
    debug!(
        width = decoded.width(),
        height = decoded.height(),
        color = ?decoded.color(),
        "image decoded"
    );

    let resized = decoded.resize_exact(spec.width, spec.height, FilterType::CatmullRom);

    let (channels, raw) = match spec.channels {
        ChannelMode::Rgb => (3, resized.to_rgb8().into_raw()),
        ChannelMode::Native => match resized.color().channel_count() {
            1 => (1, resized.to_luma8().into_raw()),
            2 => (2, resized.to_luma_alpha8().into_raw()),
            3 => (3, resized.to_rgb8().into_raw()),
            _ => (4, resized.to_rgba8().into_raw()),
        },
    };

    let (height, width) = (resized.height() as usize, resized.width() as usize);
    let pixels = Array3::from_shape_vec((height, width, channels), raw)
        .map_err(|e| GatewayError::ImageDecode(e.to_string()))?
        .mapv(|v| f32::from(v) / 255.0);

    if spec.strict_shape {
        ensure_shape(&pixels, [spec.height as usize, spec.width as usize, 3])?;
    }

    Ok(pixels.insert_axis(Axis(0)).into_dyn())
}

/// Fails with `ShapeMismatch` unless `pixels` is exactly `expected`.
pub fn ensure_shape(pixels: &Array3<f32>, expected: [usize; 3]) -> Result<(), GatewayError> {
    if pixels.shape() != &expected[..] {
        return Err(GatewayError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: pixels.shape().to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
    use serde_json::json;
    use std::io::Cursor;

    fn encode(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn brain_spec() -> ImageSpec {
        ImageSpec {
            width: 128,
            height: 128,
            channels: ChannelMode::Rgb,
            strict_shape: true,
        }
    }

    #[test]
    fn feature_row_is_single_row() {
        let row = feature_row(vec![2.0, 120.0, 70.0]).unwrap();
        assert_eq!(row.shape(), &[1, 3]);
        assert_eq!(row[[0, 1]], 120.0);
    }

    #[test]
    fn feature_row_rejects_empty_and_nan() {
        assert!(matches!(feature_row(vec![]), Err(GatewayError::InvalidInput(_))));
        assert!(matches!(
            feature_row(vec![1.0, f64::NAN]),
            Err(GatewayError::InvalidInput(_))
        ));
    }

    // First element nested at every level, the rest bare numbers.
    fn comb(depth: usize, width: usize) -> Value {
        let mut value = json!(vec![1.0; width]);
        for _ in 1..depth {
            let mut items = vec![value];
            items.extend(std::iter::repeat(json!(1)).take(width - 1));
            value = Value::Array(items);
        }
        value
    }

    #[test]
    fn comb_shaped_input_is_rejected_without_allocating() {
        // 1500^4 elements claimed by the first branch
        let err = tensor_from_json(&comb(4, 1500)).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(ref m) if m.contains("ragged")), "{err}");

        // 2000^6 does not fit in usize
        let err = tensor_from_json(&comb(6, 2000)).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)), "{err}");
    }

    #[test]
    fn nested_json_becomes_dense_tensor() {
        let tensor = tensor_from_json(&json!([[[0.0, 0.5], [1.0, 0.25]]])).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 2]);
        assert_eq!(tensor[[0, 1, 1]], 0.25);
    }

    #[test]
    fn ragged_or_non_numeric_json_is_rejected() {
        assert!(tensor_from_json(&json!([[1.0, 2.0], [3.0]])).is_err());
        assert!(tensor_from_json(&json!([[1.0, "x"]])).is_err());
        assert!(tensor_from_json(&json!(3.0)).is_err());
        assert!(tensor_from_json(&json!([])).is_err());
    }

    #[test]
    fn rgb_image_is_resized_and_scaled() {
        let image = RgbImage::from_pixel(300, 200, image::Rgb([255, 0, 51]));
        let tensor = image_tensor(&encode(DynamicImage::ImageRgb8(image)), &brain_spec()).unwrap();

        assert_eq!(tensor.shape(), &[1, 128, 128, 3]);
        assert!((tensor[[0, 10, 10, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 10, 10, 1]].abs() < 1e-6);
        assert!((tensor[[0, 10, 10, 2]] - 0.2).abs() < 1e-6);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn grayscale_forced_to_rgb_for_strict_models() {
        let image = GrayImage::from_pixel(64, 64, image::Luma([128]));
        let tensor = image_tensor(&encode(DynamicImage::ImageLuma8(image)), &brain_spec()).unwrap();
        assert_eq!(tensor.shape(), &[1, 128, 128, 3]);
    }

    #[test]
    fn native_mode_keeps_channel_count() {
        let spec = ImageSpec {
            width: 256,
            height: 256,
            channels: ChannelMode::Native,
            strict_shape: false,
        };
        let image = GrayImage::from_pixel(32, 32, image::Luma([0]));
        let tensor = image_tensor(&encode(DynamicImage::ImageLuma8(image)), &spec).unwrap();
        assert_eq!(tensor.shape(), &[1, 256, 256, 1]);
    }

    #[test]
    fn non_image_bytes_fail_to_decode() {
        let err = image_tensor(b"%PDF-1.4 definitely not pixels", &brain_spec()).unwrap_err();
        assert!(matches!(err, GatewayError::ImageDecode(_)));
    }

    #[test]
    fn empty_upload_is_invalid_input() {
        let err = image_tensor(&[], &brain_spec()).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[test]
    fn ensure_shape_rejects_four_channels() {
        let pixels = Array3::<f32>::zeros((128, 128, 4));
        let err = ensure_shape(&pixels, [128, 128, 3]).unwrap_err();
        match err {
            GatewayError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, vec![128, 128, 3]);
                assert_eq!(actual, vec![128, 128, 4]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
