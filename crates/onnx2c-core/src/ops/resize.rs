// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Resize`, grounded in `original_source/src/nodes/resize.h`.
//!
//! `scales`/`sizes` must be compile-time constants, like every other
//! shape-affecting input in this compiler. `roi` (and the `tf_crop_and_resize`
//! coordinate mode that consumes it) is not implemented. `cubic` sampling is
//! rejected per §4.3.

use crate::error::{CompileError, Result};
use crate::graph::Graph;
use crate::operator::{Operator, OperatorInstance};
use crate::ops::common::*;
use crate::shape::Shape;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordMode {
    HalfPixel,
    PytorchHalfPixel,
    AlignCorners,
    Asymmetric,
    TfHalfPixelForNn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NearestMode {
    RoundPreferFloor,
    RoundPreferCeil,
    Floor,
    Ceil,
}

#[derive(Debug, Default)]
pub struct Resize {
    sample_mode: Option<SampleMode>,
    coord_mode: Option<CoordMode>,
    nearest_mode: Option<NearestMode>,
    /// Per-axis `out_dim / in_dim`, computed once shapes are known.
    scales: Vec<f64>,
}

impl Operator for Resize {
    fn parse_attributes(&mut self, attrs: &[crate::attribute::Attr]) -> Result<()> {
        reject_unknown_attrs(
            attrs,
            &[
                "coordinate_transformation_mode",
                "cubic_coeff_a",
                "exclude_outside",
                "extrapolation_value",
                "mode",
                "nearest_mode",
            ],
            "Resize",
        )?;
        self.sample_mode = Some(match attr_string(attrs, "mode", "nearest") {
            "nearest" => SampleMode::Nearest,
            "linear" => SampleMode::Linear,
            "cubic" => return Err(CompileError::unimplemented_feature("Resize: mode `cubic`", None)),
            other => return Err(CompileError::unimplemented_feature(format!("Resize: mode `{other}`"), None)),
        });
        self.coord_mode = Some(match attr_string(attrs, "coordinate_transformation_mode", "half_pixel") {
            "half_pixel" => CoordMode::HalfPixel,
            "pytorch_half_pixel" => CoordMode::PytorchHalfPixel,
            "align_corners" => CoordMode::AlignCorners,
            "asymmetric" => CoordMode::Asymmetric,
            "tf_half_pixel_for_nn" => CoordMode::TfHalfPixelForNn,
            other => {
                return Err(CompileError::unimplemented_feature(
                    format!("Resize: coordinate_transformation_mode `{other}`"),
                    None,
                ));
            }
        });
        self.nearest_mode = Some(match attr_string(attrs, "nearest_mode", "round_prefer_floor") {
            "round_prefer_floor" => NearestMode::RoundPreferFloor,
            "round_prefer_ceil" => NearestMode::RoundPreferCeil,
            "floor" => NearestMode::Floor,
            "ceil" => NearestMode::Ceil,
            other => return Err(CompileError::unimplemented_feature(format!("Resize: nearest_mode `{other}`"), None)),
        });
        Ok(())
    }

    fn resolve(&mut self, graph: &mut Graph, inst: &mut OperatorInstance) -> Result<()> {
        let x_id = input_id(inst, 0, "Resize")?;
        inst.register_input(x_id, "X");

        let roi_present = inst.input(1).map(|id| graph.tensor(id).shape.size() > 0).unwrap_or(false);
        require(!roi_present, "Resize: `roi` (tf_crop_and_resize) is not implemented")?;

        let scales_id = inst.input(2);
        let sizes_id = inst.input(3);

        let x = graph.tensor(x_id);
        let rank = x.rank();
        let mut out_dims = x.shape.dims().to_vec();
        let mut scales = vec![1.0f64; rank];

        if let Some(id) = sizes_id {
            let sizes_t = graph.tensor(id);
            if sizes_t.shape.size() > 0 {
                inst.register_input(id, "sizes");
                require(sizes_t.is_const, "Resize: non-const `sizes` not handled")?;
                let sizes = sizes_t
                    .as_i64_vec()
                    .ok_or_else(|| CompileError::incorrect_input("Resize: `sizes` is not a readable int64 constant", None))?;
                require(sizes.len() == rank, "Resize: `sizes` must have `rank` elements")?;
                for d in 0..rank {
                    out_dims[d] = sizes[d] as usize;
                    scales[d] = out_dims[d] as f64 / x.shape.dim(d).max(1) as f64;
                }
            }
        } else if let Some(id) = scales_id {
            let scales_t = graph.tensor(id);
            if scales_t.shape.size() > 0 {
                inst.register_input(id, "scales");
                require(scales_t.is_const, "Resize: non-const `scales` not handled")?;
                let vals = scales_t
                    .as_f32_vec()
                    .ok_or_else(|| CompileError::incorrect_input("Resize: `scales` is not a readable f32 constant", None))?;
                require(vals.len() == rank, "Resize: `scales` must have `rank` elements")?;
                for d in 0..rank {
                    scales[d] = vals[d] as f64;
                    out_dims[d] = ((x.shape.dim(d) as f64) * scales[d]).floor() as usize;
                }
            }
        } else {
            return Err(CompileError::incorrect_input("Resize: one of `scales`/`sizes` must be provided", None));
        }

        self.scales = scales;
        let y = Tensor::new(graph.anonymous_name("Resize_out"), x.data_type, Shape::new(out_dims));
        let y_id = graph.add_tensor(y);
        inst.register_output(y_id, "Y");
        Ok(())
    }

    fn emit_body(&self, inst: &OperatorInstance, graph: &Graph, out: &mut String) -> Result<()> {
        let x = graph.tensor(inst.input_params[0].tensor);
        let y = graph.tensor(inst.output_params[0].tensor);
        let rank = x.rank();
        let sample_mode = self.sample_mode.expect("parse_attributes sets sample_mode");
        let coord_mode = self.coord_mode.expect("parse_attributes sets coord_mode");
        let nearest_mode = self.nearest_mode.expect("parse_attributes sets nearest_mode");

        for d in 0..rank {
            out.push_str(&format!(
                "{ind}for (uint32_t o{d} = 0; o{d} < {bound}; o{d}++) {{\n",
                ind = crate::util::indent(1 + d),
                bound = y.shape.dim(d)
            ));
        }
        let body = crate::util::indent(1 + rank);

        for d in 0..rank {
            let in_dim = x.shape.dim(d);
            let out_dim = y.shape.dim(d);
            let scale = self.scales[d];
            let coord_expr = match coord_mode {
                CoordMode::HalfPixel => format!("(((double)o{d} + 0.5) / {scale} - 0.5)"),
                CoordMode::PytorchHalfPixel => {
                    if out_dim > 1 {
                        format!("(((double)o{d} + 0.5) / {scale} - 0.5)")
                    } else {
                        "0.0".to_string()
                    }
                }
                CoordMode::AlignCorners => {
                    if out_dim > 1 {
                        format!("((double)o{d} * {} / {})", (in_dim as i64 - 1).max(0), (out_dim - 1))
                    } else {
                        "0.0".to_string()
                    }
                }
                CoordMode::Asymmetric => format!("((double)o{d} / {scale})"),
                CoordMode::TfHalfPixelForNn => format!("(((double)o{d} + 0.5) / {scale})"),
            };
            out.push_str(&format!("{body}double coord{d} = {coord_expr};\n"));
        }

        match sample_mode {
            SampleMode::Nearest => {
                for d in 0..rank {
                    let in_dim = x.shape.dim(d);
                    let round_expr = match nearest_mode {
                        NearestMode::RoundPreferCeil => format!("(int32_t)floor(coord{d} + 0.5)"),
                        NearestMode::RoundPreferFloor => format!("(int32_t)ceil(coord{d} - 0.5)"),
                        NearestMode::Floor => format!("(int32_t)floor(coord{d})"),
                        NearestMode::Ceil => format!("(int32_t)ceil(coord{d})"),
                    };
                    out.push_str(&format!("{body}int32_t idx{d} = {round_expr};\n"));
                    out.push_str(&format!("{body}if (idx{d} < 0) idx{d} = 0;\n"));
                    out.push_str(&format!("{body}if (idx{d} >= {in_dim}) idx{d} = {in_dim} - 1;\n"));
                }
                let out_idx: String = (0..rank).map(|d| format!("[o{d}]")).collect();
                let in_idx: String = (0..rank).map(|d| format!("[idx{d}]")).collect();
                out.push_str(&format!("{body}Y{out_idx} = X{in_idx};\n"));
            }
            SampleMode::Linear => {
                for d in 0..rank {
                    let in_dim = x.shape.dim(d);
                    out.push_str(&format!("{body}int32_t low{d} = (int32_t)floor(coord{d});\n"));
                    out.push_str(&format!("{body}double frac{d} = coord{d} - floor(coord{d});\n"));
                    out.push_str(&format!("{body}if (low{d} < 0) {{ low{d} = 0; frac{d} = 0.0; }}\n"));
                    out.push_str(&format!("{body}if (low{d} >= {in_dim}) {{ low{d} = {in_dim} - 1; frac{d} = 0.0; }}\n"));
                    out.push_str(&format!("{body}int32_t high{d} = low{d} + 1;\n"));
                    out.push_str(&format!("{body}if (high{d} >= {in_dim}) high{d} = {in_dim} - 1;\n"));
                }
                out.push_str(&format!("{body}double resize_acc = 0.0;\n"));
                out.push_str(&format!(
                    "{body}for (uint32_t corner = 0; corner < {n}; corner++) {{\n",
                    n = 1u32 << rank
                ));
                let inner = crate::util::indent(2 + rank);
                out.push_str(&format!("{inner}double weight = 1.0;\n"));
                out.push_str(&format!("{inner}int32_t idx[{rank}];\n"));
                for d in 0..rank {
                    out.push_str(&format!(
                        "{inner}if ((corner >> {d}) & 1u) {{ idx[{d}] = high{d}; weight *= frac{d}; }} else {{ idx[{d}] = low{d}; weight *= (1.0 - frac{d}); }}\n"
                    ));
                }
                let in_idx: String = (0..rank).map(|d| format!("[idx[{d}]]")).collect();
                out.push_str(&format!("{inner}resize_acc += weight * X{in_idx};\n"));
                out.push_str(&format!("{body}}}\n"));
                let out_idx: String = (0..rank).map(|d| format!("[o{d}]")).collect();
                out.push_str(&format!("{body}Y{out_idx} = ({})resize_acc;\n", x.c_type()));
            }
        }

        for d in (0..rank).rev() {
            out.push_str(&format!("{}}}\n", crate::util::indent(1 + d)));
        }
        Ok(())
    }
}

pub fn register(r: &mut crate::registry::OpRegistry) {
    crate::registry::reg(r, "Resize", || Box::new(Resize::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DataType;

    #[test]
    fn resize_scales_doubles_spatial_dims() {
        let mut graph = Graph::new();
        let mut x = Tensor::new("x", DataType::Float, Shape::new(vec![1, 1, 4, 4]));
        x.is_io = true;
        let x = graph.add_tensor(x);

        let roi = graph.add_tensor(Tensor::new("", DataType::Float, Shape::new(vec![0])));
        let mut scales_buf = Vec::new();
        for v in [1.0f32, 1.0, 2.0, 2.0] {
            scales_buf.extend_from_slice(&v.to_le_bytes());
        }
        let scales = graph.add_tensor(Tensor::constant("scales", DataType::Float, Shape::new(vec![4]), scales_buf));

        let mut inst = OperatorInstance::new("Resize", "r1", Box::new(Resize::default()));
        inst.inputs = vec![Some(x), Some(roi), Some(scales)];
        let mut op = Resize::default();
        op.parse_attributes(&[]).unwrap();
        op.resolve(&mut graph, &mut inst).unwrap();
        let y = graph.tensor(inst.output_params[0].tensor);
        assert_eq!(y.shape.dims(), &[1, 1, 8, 8]);
    }
}
