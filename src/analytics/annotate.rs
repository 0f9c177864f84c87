use opencv::core::{Mat, Point, Rect, Scalar, Size, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

use super::detector::Detection;

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f64 = 0.5;
const LABEL_OFFSET: i32 = 5;
const LABEL_MIN_Y: i32 = 12;

fn box_colour() -> Scalar {
    // BGR green
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

pub fn resize_to_width(frame: &Mat, width: u32) -> opencv::Result<Mat> {
    let cols = frame.cols();
    let rows = frame.rows();
    let width = width as i32;
    if cols == 0 || rows == 0 || cols == width {
        return frame.try_clone();
    }

    let height = ((rows as f64) * (width as f64) / (cols as f64)).round().max(1.0) as i32;
    let interpolation = if width < cols {
        imgproc::INTER_AREA
    } else {
        imgproc::INTER_LINEAR
    };

    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        interpolation,
    )?;
    Ok(resized)
}

/// Draws boxes and labels onto a copy of `frame`; the input is left untouched.
pub fn annotate(frame: &Mat, detections: &[Detection]) -> opencv::Result<Mat> {
    let mut output = frame.try_clone()?;

    for detection in detections {
        let rect = Rect::new(
            detection.x.round() as i32,
            detection.y.round() as i32,
            detection.width.round() as i32,
            detection.height.round() as i32,
        );
        imgproc::rectangle(
            &mut output,
            rect,
            box_colour(),
            BOX_THICKNESS,
            imgproc::LINE_8,
            0,
        )?;

        let origin = Point::new(rect.x, (rect.y - LABEL_OFFSET).max(LABEL_MIN_Y));
        imgproc::put_text(
            &mut output,
            &detection.label(),
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            LABEL_SCALE,
            box_colour(),
            BOX_THICKNESS,
            imgproc::LINE_8,
            false,
        )?;
    }

    Ok(output)
}

pub fn encode_jpeg(frame: &Mat, quality: i32) -> opencv::Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let params = Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, quality]);
    imgcodecs::imencode(".jpg", frame, &mut buf, &params)?;
    Ok(buf.to_vec())
}
