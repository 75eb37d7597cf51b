//! The "sls" colour table, black to white in 200 flat steps.

pub(super) const SLS: [[f32; 3]; 200] = [
    [0.0, 0.0, 0.0], [0.04314, 0.0, 0.05098], [0.08627, 0.0, 0.10588], [0.12941, 0.0, 0.15686],
    [0.17255, 0.0, 0.21176], [0.21569, 0.0, 0.26275], [0.25882, 0.0, 0.31765],
    [0.30588, 0.0, 0.36863], [0.34902, 0.0, 0.42353], [0.39216, 0.0, 0.47451],
    [0.43529, 0.0, 0.52941], [0.47843, 0.0, 0.58039], [0.52157, 0.0, 0.63529],
    [0.50588, 0.0, 0.63922], [0.49412, 0.0, 0.64706], [0.47843, 0.0, 0.65098],
    [0.46275, 0.0, 0.65882], [0.44706, 0.0, 0.66275], [0.43529, 0.0, 0.66667],
    [0.41961, 0.0, 0.67451], [0.40392, 0.0, 0.67843], [0.39216, 0.0, 0.68627],
    [0.37647, 0.0, 0.6902], [0.36078, 0.0, 0.69804], [0.3451, 0.0, 0.70196],
    [0.31765, 0.0, 0.71373], [0.2902, 0.0, 0.72157], [0.25882, 0.0, 0.73333],
    [0.23137, 0.0, 0.74118], [0.20392, 0.0, 0.75294], [0.17255, 0.0, 0.76471],
    [0.1451, 0.0, 0.77255], [0.11373, 0.0, 0.78431], [0.08627, 0.0, 0.79216],
    [0.05882, 0.0, 0.80392], [0.02745, 0.0, 0.81569], [0.0, 0.0, 0.82353], [0.0, 0.01961, 0.83922],
    [0.0, 0.03922, 0.8549], [0.0, 0.05882, 0.86667], [0.0, 0.07843, 0.88235],
    [0.0, 0.09804, 0.89804], [0.0, 0.11765, 0.91373], [0.0, 0.13725, 0.92549],
    [0.0, 0.15686, 0.94118], [0.0, 0.17647, 0.95686], [0.0, 0.2, 0.97255], [0.0, 0.21961, 0.98431],
    [0.0, 0.23922, 1.0], [0.0, 0.26667, 1.0], [0.0, 0.29804, 1.0], [0.0, 0.32941, 1.0],
    [0.0, 0.36078, 1.0], [0.0, 0.39216, 1.0], [0.0, 0.42353, 1.0], [0.0, 0.45098, 1.0],
    [0.0, 0.48235, 1.0], [0.0, 0.51373, 1.0], [0.0, 0.5451, 1.0], [0.0, 0.57647, 1.0],
    [0.0, 0.60784, 1.0], [0.0, 0.63137, 0.97647], [0.0, 0.65882, 0.94902], [0.0, 0.68235, 0.92549],
    [0.0, 0.70588, 0.90196], [0.0, 0.73333, 0.87843], [0.0, 0.75686, 0.85098],
    [0.0, 0.78431, 0.82745], [0.0, 0.80784, 0.80392], [0.0, 0.83137, 0.77647],
    [0.0, 0.85882, 0.75294], [0.0, 0.88235, 0.72941], [0.0, 0.9098, 0.70196],
    [0.0, 0.90196, 0.67843], [0.0, 0.89412, 0.65098], [0.0, 0.8902, 0.62353],
    [0.0, 0.88235, 0.59608], [0.0, 0.87843, 0.56863], [0.0, 0.87059, 0.54118],
    [0.0, 0.86275, 0.51373], [0.0, 0.85882, 0.48627], [0.0, 0.85098, 0.46275],
    [0.0, 0.84706, 0.43529], [0.0, 0.83922, 0.40784], [0.0, 0.83137, 0.38039],
    [0.0, 0.83137, 0.35294], [0.0, 0.83137, 0.32941], [0.0, 0.83137, 0.30196],
    [0.0, 0.83137, 0.27843], [0.0, 0.83137, 0.25098], [0.0, 0.83137, 0.22745], [0.0, 0.83137, 0.2],
    [0.0, 0.83137, 0.17647], [0.0, 0.82745, 0.14902], [0.0, 0.82745, 0.12549],
    [0.0, 0.82745, 0.09804], [0.0, 0.82745, 0.07451], [0.03137, 0.83529, 0.06667],
    [0.06667, 0.83922, 0.05882], [0.09804, 0.84706, 0.0549], [0.13333, 0.85098, 0.04706],
    [0.16471, 0.85882, 0.04314], [0.2, 0.86667, 0.03529], [0.23137, 0.87059, 0.03137],
    [0.26667, 0.87843, 0.02353], [0.29804, 0.88235, 0.01961], [0.33333, 0.8902, 0.01176],
    [0.36471, 0.89412, 0.00784], [0.39608, 0.90196, 0.0], [0.43137, 0.90196, 0.0],
    [0.46275, 0.90196, 0.0], [0.49804, 0.90196, 0.0], [0.52941, 0.90196, 0.0],
    [0.56471, 0.90196, 0.0], [0.59608, 0.90196, 0.0], [0.62745, 0.90196, 0.0],
    [0.66275, 0.90196, 0.0], [0.69412, 0.90196, 0.0], [0.72941, 0.90196, 0.0],
    [0.76078, 0.90196, 0.0], [0.79216, 0.90196, 0.0], [0.81176, 0.89804, 0.00392],
    [0.82745, 0.89412, 0.00784], [0.84314, 0.88627, 0.01176], [0.86275, 0.88235, 0.01569],
    [0.87843, 0.87843, 0.01961], [0.89804, 0.87451, 0.02353], [0.91373, 0.86667, 0.02745],
    [0.92941, 0.86275, 0.03137], [0.94902, 0.85882, 0.03529], [0.96471, 0.8549, 0.03922],
    [0.98431, 0.84706, 0.04314], [1.0, 0.84314, 0.04706], [0.99608, 0.82353, 0.05098],
    [0.99216, 0.80784, 0.0549], [0.98824, 0.78824, 0.05882], [0.98431, 0.76863, 0.06275],
    [0.98039, 0.74902, 0.06667], [0.97255, 0.72941, 0.07059], [0.96863, 0.71373, 0.07451],
    [0.96471, 0.69412, 0.07843], [0.96078, 0.67451, 0.08235], [0.95686, 0.6549, 0.08627],
    [0.95294, 0.63922, 0.0902], [0.94902, 0.61961, 0.09412], [0.95294, 0.6, 0.08627],
    [0.95686, 0.58039, 0.07843], [0.96078, 0.56471, 0.07059], [0.96471, 0.5451, 0.06275],
    [0.96863, 0.52549, 0.0549], [0.97255, 0.50588, 0.04706], [0.98039, 0.4902, 0.03922],
    [0.98431, 0.47059, 0.03137], [0.98824, 0.45098, 0.02353], [0.99216, 0.43137, 0.01569],
    [0.99608, 0.41176, 0.00784], [1.0, 0.39608, 0.0], [1.0, 0.36078, 0.0], [0.99608, 0.32941, 0.0],
    [0.99608, 0.29804, 0.0], [0.99216, 0.26275, 0.0], [0.99216, 0.23137, 0.0],
    [0.98824, 0.19608, 0.0], [0.98824, 0.16471, 0.0], [0.98824, 0.13333, 0.0],
    [0.98431, 0.09804, 0.0], [0.98431, 0.06667, 0.0], [0.98039, 0.03137, 0.0], [0.98039, 0.0, 0.0],
    [0.95686, 0.0, 0.0], [0.93333, 0.0, 0.0], [0.90588, 0.0, 0.0], [0.88235, 0.0, 0.0],
    [0.85882, 0.0, 0.0], [0.83529, 0.0, 0.0], [0.81176, 0.0, 0.0], [0.78824, 0.0, 0.0],
    [0.76078, 0.0, 0.0], [0.73725, 0.0, 0.0], [0.71373, 0.0, 0.0], [0.6902, 0.0, 0.0],
    [0.71765, 0.08235, 0.08235], [0.74118, 0.16863, 0.16863], [0.76863, 0.25098, 0.25098],
    [0.79216, 0.33333, 0.33333], [0.81961, 0.41569, 0.41569], [0.84314, 0.50196, 0.50196],
    [0.87059, 0.58431, 0.58431], [0.89804, 0.66667, 0.66667], [0.92157, 0.74902, 0.74902],
    [0.94902, 0.83137, 0.83137], [0.97255, 0.91765, 0.91765], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];
